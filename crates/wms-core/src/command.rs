//! Command abstractions.

use uuid::Uuid;

use crate::envelope::CorrelationContext;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// Correlation context stamped onto every envelope this command produces.
    fn correlation_context(&self) -> CorrelationContext {
        CorrelationContext::new(self.correlation_id())
    }
}
