use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{OperationError, OperationKind, TransportError};
use crate::identifier::Identifier;

type Outcome<T> = Result<T, OperationError>;

/// Single-slot cell holding the outstanding operation of one kind on one entity.
#[derive(Debug)]
pub(crate) struct PendingSlot<T> {
    operation: OperationKind,
    sender: Option<oneshot::Sender<Outcome<T>>>,
}

impl<T> PendingSlot<T> {
    pub(crate) fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            sender: None,
        }
    }

    /// Arms the slot, rejecting a second operation while one is outstanding.
    ///
    /// A slot whose receiver was dropped counts as free.
    pub(crate) fn begin(&mut self, entity: &Identifier) -> Result<Pending<T>, OperationError> {
        if self
            .sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
        {
            return Err(OperationError::Busy {
                operation: self.operation,
                entity: entity.clone(),
            });
        }

        let (sender, receiver) = oneshot::channel();
        self.sender = Some(sender);
        Ok(Pending {
            operation: self.operation,
            receiver,
        })
    }

    /// Whether a requester is still waiting. A slot whose receiver was dropped is cleared.
    pub(crate) fn is_armed(&mut self) -> bool {
        if self.sender.as_ref().is_some_and(oneshot::Sender::is_closed) {
            self.sender = None;
        }
        self.sender.is_some()
    }

    /// Resolves the outstanding operation; returns `false` when nothing was pending.
    pub(crate) fn resolve(&mut self, result: Result<T, TransportError>) -> bool {
        let Some(sender) = self.sender.take() else {
            return false;
        };
        let operation = self.operation;
        // The requester may have stopped waiting; that is not an error here.
        let _ = sender.send(result.map_err(|source| OperationError::Transport { operation, source }));
        true
    }
}

/// The eventual result of a characteristic or descriptor operation.
#[derive(Debug)]
pub struct Pending<T> {
    operation: OperationKind,
    receiver: oneshot::Receiver<Outcome<T>>,
}

impl<T> Pending<T> {
    #[must_use]
    pub fn operation(&self) -> OperationKind {
        self.operation
    }
}

impl<T> Future for Pending<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or(Err(OperationError::Abandoned { operation }))
        })
    }
}
