use canvas_proto::Command;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{LinkError, QueueOverflow, SystemError};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded FIFO between Systems/Missions (producers) and the link worker (consumer).
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (CommandSender { tx, capacity }, CommandReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
    capacity: usize,
}

impl CommandSender {
    /// Never blocks. A full queue rejects the command instead of dropping it.
    pub fn enqueue(&self, command: Command) -> Result<(), SystemError> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => Err(QueueOverflow { command, capacity: self.capacity }.into()),
            Err(TrySendError::Closed(_)) => Err(LinkError::Closed.into()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Command>,
}

impl CommandReceiver {
    pub fn try_dequeue(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }

    /// For the blocking link worker thread. `None` once every sender is gone.
    pub fn blocking_dequeue(&mut self) -> Option<Command> {
        self.rx.blocking_recv()
    }

    pub async fn dequeue(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    pub fn drain(&mut self) -> Vec<Command> {
        std::iter::from_fn(|| self.try_dequeue()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_proto::Ned;

    #[test]
    fn preserves_issue_order() {
        let (tx, mut rx) = command_queue(8);
        tx.enqueue(Command::Arm).unwrap();
        tx.enqueue(Command::Takeoff { altitude_m: 5.0 }).unwrap();
        tx.enqueue(Command::Goto(Ned::new(1.0, 0.0, -5.0))).unwrap();
        assert_eq!(
            rx.drain(),
            vec![Command::Arm, Command::Takeoff { altitude_m: 5.0 }, Command::Goto(Ned::new(1.0, 0.0, -5.0))]
        );
    }

    #[test]
    fn overflow_fails_loudly_with_the_command() {
        let (tx, _rx) = command_queue(2);
        tx.enqueue(Command::Arm).unwrap();
        tx.enqueue(Command::Heartbeat).unwrap();
        match tx.enqueue(Command::Land) {
            Err(SystemError::Overflow(o)) => {
                assert_eq!(o.command, Command::Land);
                assert_eq!(o.capacity, 2);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn closed_queue_is_a_link_error() {
        let (tx, rx) = command_queue(2);
        drop(rx);
        assert!(matches!(tx.enqueue(Command::Arm), Err(SystemError::Link(LinkError::Closed))));
    }
}
