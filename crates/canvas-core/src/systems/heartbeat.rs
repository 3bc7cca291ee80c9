use canvas_proto::Command;

use crate::error::SystemError;
use crate::scheduler::{System, TickContext};

/// Ground-station keepalive so the autopilot keeps the link and guided control alive.
#[derive(Debug, Default)]
pub struct HeartbeatSystem {
    sent: u64,
}

impl HeartbeatSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl System for HeartbeatSystem {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError> {
        ctx.commands.enqueue(Command::Heartbeat)?;
        self.sent += 1;
        Ok(())
    }
}
