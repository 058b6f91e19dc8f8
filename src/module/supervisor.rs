//! 模块循环的重启策略
//! Restart policy of the module loop

use crate::event::Event;
use std::any::Any;
use std::collections::VecDeque;

/// What happens to the undispatched rest of a batch when a handler panics.
///
/// The event whose handler panicked is never retried under either policy.
///
/// 处理器panic时，批次中尚未分发的剩余事件如何处理。无论哪种策略，引发panic的事件都不会重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Drop every event already taken into the current batch.
    /// 丢弃已取入当前批次的所有事件。
    #[default]
    DropBatch,
    /// Keep the remaining events and dispatch them after the restart.
    /// 保留剩余事件并在重启后分发。
    RequeueRemaining,
}

/// Owns the restart decision for one module loop.
/// 负责一个模块循环的重启决策。
#[derive(Debug)]
pub(super) struct Supervisor {
    policy: RestartPolicy,
}

impl Supervisor {
    pub(super) fn new(policy: RestartPolicy) -> Self {
        Self { policy }
    }

    /// Applies the policy to what is left of the batch. Returns the number of dropped events.
    /// 对批次剩余部分应用策略。返回丢弃的事件数。
    pub(super) fn apply(&self, batch: &mut VecDeque<Event>) -> usize {
        match self.policy {
            RestartPolicy::DropBatch => {
                let dropped = batch.len();
                batch.clear();
                dropped
            }
            RestartPolicy::RequeueRemaining => 0,
        }
    }
}

/// Extracts the message of a caught panic.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RpcRequest;
    use crate::value::Args;

    fn rpc(name: &str) -> Event {
        Event::Rpc(RpcRequest {
            sender: None,
            name: name.to_string(),
            args: Args::new(),
        })
    }

    #[test]
    fn test_drop_batch_clears_remaining() {
        let mut batch: VecDeque<_> = ["a", "b", "c"].into_iter().map(rpc).collect();
        assert_eq!(Supervisor::new(RestartPolicy::DropBatch).apply(&mut batch), 3);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_requeue_keeps_remaining() {
        let mut batch: VecDeque<_> = ["a", "b"].into_iter().map(rpc).collect();
        assert_eq!(Supervisor::new(RestartPolicy::RequeueRemaining).apply(&mut batch), 0);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom 7");
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static");
    }
}
