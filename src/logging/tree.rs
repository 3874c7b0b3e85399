//! Entry detail tree
//!
//! Converts a log entry into a name/value tree for the detail pane. Each
//! known shape says how it expands through [`ToTree`]; JSON payloads are
//! expanded structurally and anything else ends up as an opaque leaf.

use super::entry::{
    HttpRequest, LogEntry, LogEntryOperation, MonitoredResource, SourceLocation,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// One node of the detail tree. Displayed as `name : value`, or just
/// `name` when there is no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub value: Option<String>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Child by name
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Display label
    pub fn label(&self) -> String {
        match self.value.as_deref() {
            Some(v) if !v.trim().is_empty() => format!("{} : {}", self.name, v),
            _ => self.name.clone(),
        }
    }

    /// Depth-first `(depth, node)` walk, used for flat rendering
    pub fn flatten(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::new();
        self.walk(0, &mut out);
        out
    }

    fn walk<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a TreeNode)>) {
        out.push((depth, self));
        for child in &self.children {
            child.walk(depth + 1, out);
        }
    }
}

/// A shape that knows how to expand itself into a tree node
pub trait ToTree {
    fn to_tree(&self, name: &str) -> TreeNode;
}

/// Collects children, skipping absent fields
#[derive(Default)]
struct Children(Vec<TreeNode>);

impl Children {
    fn text(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.0.push(TreeNode::leaf(name, v));
        }
        self
    }

    fn display<T: std::fmt::Display>(&mut self, name: &str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.0.push(TreeNode::leaf(name, v.to_string()));
        }
        self
    }

    fn node<T: ToTree>(&mut self, name: &str, value: Option<&T>) -> &mut Self {
        if let Some(v) = value {
            self.0.push(v.to_tree(name));
        }
        self
    }

    fn into_branch(self, name: &str) -> TreeNode {
        TreeNode::branch(name, self.0)
    }
}

impl ToTree for BTreeMap<String, String> {
    fn to_tree(&self, name: &str) -> TreeNode {
        TreeNode::branch(
            name,
            self.iter().map(|(k, v)| TreeNode::leaf(k.as_str(), v.as_str())).collect(),
        )
    }
}

impl ToTree for Value {
    fn to_tree(&self, name: &str) -> TreeNode {
        match self {
            Value::Object(map) => TreeNode::branch(
                name,
                map.iter().map(|(k, v)| v.to_tree(k)).collect(),
            ),
            Value::Array(items) => TreeNode {
                name: name.to_string(),
                value: Some(format!("[{}]", items.len())),
                children: items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| v.to_tree(&format!("[{}]", i)))
                    .collect(),
            },
            Value::String(s) => TreeNode::leaf(name, s.as_str()),
            Value::Null => TreeNode {
                name: name.to_string(),
                value: None,
                children: Vec::new(),
            },
            other => TreeNode::leaf(name, other.to_string()),
        }
    }
}

impl ToTree for MonitoredResource {
    fn to_tree(&self, name: &str) -> TreeNode {
        let mut c = Children::default();
        c.text("Type", Some(self.resource_type.as_str()));
        if !self.labels.is_empty() {
            c.node("Labels", Some(&self.labels));
        }
        c.into_branch(name)
    }
}

impl ToTree for HttpRequest {
    fn to_tree(&self, name: &str) -> TreeNode {
        let mut c = Children::default();
        c.text("RequestMethod", self.request_method.as_deref())
            .text("RequestUrl", self.request_url.as_deref())
            .display("Status", self.status)
            .text("ResponseSize", self.response_size.as_deref())
            .text("UserAgent", self.user_agent.as_deref())
            .text("RemoteIp", self.remote_ip.as_deref())
            .text("Latency", self.latency.as_deref());
        c.into_branch(name)
    }
}

impl ToTree for LogEntryOperation {
    fn to_tree(&self, name: &str) -> TreeNode {
        let mut c = Children::default();
        c.text("Id", self.id.as_deref())
            .text("Producer", self.producer.as_deref())
            .display("First", Some(self.first))
            .display("Last", Some(self.last));
        c.into_branch(name)
    }
}

impl ToTree for SourceLocation {
    fn to_tree(&self, name: &str) -> TreeNode {
        let mut c = Children::default();
        c.text("File", self.file.as_deref())
            .text("Line", self.line.as_deref())
            .text("Function", self.function.as_deref());
        c.into_branch(name)
    }
}

impl ToTree for LogEntry {
    fn to_tree(&self, name: &str) -> TreeNode {
        let mut c = Children::default();
        c.text("LogName", Some(self.log_name.as_str()))
            .node("Resource", Some(&self.resource))
            .display("Timestamp", self.timestamp.map(|t| t.to_rfc3339()))
            .display("ReceiveTimestamp", self.receive_timestamp.map(|t| t.to_rfc3339()))
            .display("Severity", Some(self.severity))
            .text("InsertId", Some(self.insert_id.as_str()).filter(|s| !s.is_empty()))
            .node("HttpRequest", self.http_request.as_ref())
            .node("Operation", self.operation.as_ref())
            .node("SourceLocation", self.source_location.as_ref());
        if !self.labels.is_empty() {
            c.node("Labels", Some(&self.labels));
        }
        c.text("Trace", self.trace.as_deref())
            .text("TextPayload", self.text_payload.as_deref())
            .node("JsonPayload", self.json_payload.as_ref())
            .node("ProtoPayload", self.proto_payload.as_ref());
        c.into_branch(name)
    }
}

/// Build the detail tree of an entry, rooted at `root`
pub fn entry_tree(entry: &LogEntry) -> TreeNode {
    entry.to_tree("root")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::entry::LogSeverity;
    use serde_json::json;

    #[test]
    fn test_json_payload_shapes() {
        let node = json!({"a": [1, "x"], "b": {"c": true}, "d": null}).to_tree("payload");

        let a = node.child("a").unwrap();
        assert_eq!(a.value.as_deref(), Some("[2]"));
        assert_eq!(a.children[0], TreeNode::leaf("[0]", "1"));
        assert_eq!(a.children[1], TreeNode::leaf("[1]", "x"));

        let b = node.child("b").unwrap();
        assert_eq!(b.child("c").unwrap().value.as_deref(), Some("true"));

        let d = node.child("d").unwrap();
        assert!(d.value.is_none() && d.is_leaf());
    }

    #[test]
    fn test_entry_skips_absent_fields() {
        let entry = LogEntry {
            log_name: "projects/p/logs/syslog".into(),
            severity: LogSeverity::Warning,
            text_payload: Some("hello".into()),
            ..Default::default()
        };

        let tree = entry_tree(&entry);
        assert_eq!(tree.name, "root");
        assert!(tree.child("HttpRequest").is_none());
        assert!(tree.child("InsertId").is_none());
        assert_eq!(tree.child("Severity").unwrap().value.as_deref(), Some("WARNING"));
        assert_eq!(tree.child("TextPayload").unwrap().label(), "TextPayload : hello");
    }

    #[test]
    fn test_http_request_node() {
        let entry = LogEntry {
            http_request: Some(HttpRequest {
                request_method: Some("GET".into()),
                status: Some(500),
                ..Default::default()
            }),
            ..Default::default()
        };
        let tree = entry_tree(&entry);
        let http = tree.child("HttpRequest").unwrap();
        assert_eq!(http.children.len(), 2);
        assert_eq!(http.child("Status").unwrap().value.as_deref(), Some("500"));
    }

    #[test]
    fn test_flatten_depths() {
        let tree = TreeNode::branch("r", vec![TreeNode::branch("a", vec![TreeNode::leaf("b", "1")])]);
        let depths: Vec<(usize, &str)> =
            tree.flatten().into_iter().map(|(d, n)| (d, n.name.as_str())).collect();
        assert_eq!(depths, vec![(0, "r"), (1, "a"), (2, "b")]);
    }

    #[test]
    fn test_branch_label_has_no_separator() {
        assert_eq!(TreeNode::branch("Resource", vec![]).label(), "Resource");
    }
}
