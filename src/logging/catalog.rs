//! Resource type and log id catalogue
//!
//! Feeds the resource and log selectors.

use serde::{Deserialize, Serialize};

/// Resource types shown first, in this order, when the project has them.
/// The first one present becomes the default selection.
pub const DEFAULT_RESOURCE_SELECTIONS: &[&str] = &["gce_instance", "gae_app", "global"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredResourceDescriptor {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl MonitoredResourceDescriptor {
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.resource_type
        } else {
            &self.display_name
        }
    }
}

/// Preferred defaults first, then everything else in server order
pub fn order_resource_descriptors(
    descriptors: Vec<MonitoredResourceDescriptor>,
) -> Vec<MonitoredResourceDescriptor> {
    let mut ordered = Vec::with_capacity(descriptors.len());

    for preferred in DEFAULT_RESOURCE_SELECTIONS {
        if let Some(desc) = descriptors.iter().find(|d| d.resource_type == *preferred) {
            ordered.push(desc.clone());
        }
    }

    ordered.extend(
        descriptors
            .into_iter()
            .filter(|d| !DEFAULT_RESOURCE_SELECTIONS.contains(&d.resource_type.as_str())),
    );

    ordered
}

/// `projects/p/logs/cloudaudit.googleapis.com%2Factivity` -> `cloudaudit.googleapis.com/activity`
pub fn log_id_from_name(name: &str) -> String {
    let raw = name.rsplit_once("/logs/").map(|(_, id)| id).unwrap_or(name);
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Full log name for a short log id, as used in `logName="..."` clauses
pub fn log_name_for(project_id: &str, log_id: &str) -> String {
    format!("projects/{}/logs/{}", project_id, urlencoding::encode(log_id))
}
