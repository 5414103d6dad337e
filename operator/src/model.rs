use kube::core::DynamicObject;

/// One object that survived a selector's filter (or came back out of an
/// aggregation script), together with whatever diagnostic message the
/// script attached to it.
#[derive(Clone, Debug)]
pub struct ResourceResult {
    pub resource: DynamicObject,
    pub message: String,
}

impl ResourceResult {
    pub fn new(resource: DynamicObject) -> Self {
        Self {
            resource,
            message: String::new(),
        }
    }

    pub fn with_message(resource: DynamicObject, message: impl Into<String>) -> Self {
        Self {
            resource,
            message: message.into(),
        }
    }
}
