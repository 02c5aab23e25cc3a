use crate::hooks::{HookHandler, HookRegistry};
use crate::types::{HookAction, HookResult};
use serde_json::Value;

struct Registration {
    event: String,
    priority: i32,
    name: String,
    handler: HookHandler,
}

/// In-process event bus for the `hooks` subcommand.
///
/// Handlers run in ascending priority order (registration order breaks ties).
/// The first result that isn't `continue` is the one reported for the event.
#[derive(Default)]
pub struct HookBus {
    registrations: Vec<Registration>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the handlers registered for `event`, in call order.
    pub fn handlers_for(&self, event: &str) -> Vec<&str> {
        self.registrations
            .iter()
            .filter(|r| r.event == event)
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn emit(&mut self, event: &str, data: &Value) -> HookResult {
        let mut reported = HookResult::proceed();
        for registration in self.registrations.iter_mut().filter(|r| r.event == event) {
            let result = (registration.handler)(data);
            tracing::trace!(
                event,
                handler = %registration.name,
                action = ?result.action,
                "hook handled"
            );
            if reported.action == HookAction::Continue && result.action != HookAction::Continue {
                reported = result;
            }
        }
        reported
    }
}

impl HookRegistry for HookBus {
    fn register(&mut self, event: &str, priority: i32, name: &str, handler: HookHandler) {
        let registration = Registration {
            event: event.to_string(),
            priority,
            name: name.to_string(),
            handler,
        };
        let at = self
            .registrations
            .partition_point(|r| r.priority <= priority);
        self.registrations.insert(at, registration);
    }
}
