use crate::messages::InvokeMessage;

/// One logical remote call as handed to a dispatcher.
///
/// The message is optional so that partially built contexts can be rejected
/// by the dispatcher with a descriptive error instead of a panic.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// The call payload. `None` is rejected at dispatch time.
    pub invoke_message: Option<InvokeMessage>,
}

impl InvocationContext {
    #[must_use]
    pub fn new(invoke_message: InvokeMessage) -> Self {
        Self {
            invoke_message: Some(invoke_message),
        }
    }
}

impl From<InvokeMessage> for InvocationContext {
    fn from(invoke_message: InvokeMessage) -> Self {
        Self::new(invoke_message)
    }
}
