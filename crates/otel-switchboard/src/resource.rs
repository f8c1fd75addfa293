//! Resource attribute state shared by all signals.

use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::resource::v1::Resource;
use std::sync::RwLock;

/// Builds a string-valued attribute.
pub(crate) fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

/// Service identity plus the mutable per-session attributes.
///
/// The user id is the one slot a connection change writes; everything else
/// is fixed at build time. The state is shared by all three signals so an
/// authenticated session tags metrics, spans, and logs alike.
pub struct AttributeState {
    service_name: String,
    service_version: Option<String>,
    extra: Vec<(String, String)>,
    user_id: RwLock<Option<String>>,
}

impl AttributeState {
    /// Creates attribute state for a service.
    pub fn new(
        service_name: impl Into<String>,
        service_version: Option<String>,
        extra: Vec<(String, String)>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_version,
            extra,
            user_id: RwLock::new(None),
        }
    }

    /// Sets the user id attached to every subsequent envelope.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        *self.user_id.write().expect("attribute state poisoned") = Some(user_id.into());
    }

    /// Returns the current user id, if any.
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().expect("attribute state poisoned").clone()
    }

    /// Assembles the proto resource for an outgoing envelope.
    pub fn to_resource(&self) -> Resource {
        let mut attributes = vec![string_attr("service.name", &self.service_name)];

        if let Some(version) = &self.service_version {
            attributes.push(string_attr("service.version", version));
        }

        for (key, value) in &self.extra {
            attributes.push(string_attr(key, value));
        }

        if let Some(user_id) = self.user_id.read().expect("attribute state poisoned").as_deref() {
            attributes.push(string_attr("enduser.id", user_id));
        }

        Resource {
            attributes,
            ..Default::default()
        }
    }
}
