//! This module contains the [`DepositSubscription`] type that the monitor uses to
//! observe new deposit events.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::mpsc;
use trestle_primitives::event::DepositEvent;

/// A live feed of deposit events, consumed via its [`futures::Stream`] API.
///
/// The stream ends when the feeding side goes away, which is how a dropped node
/// connection shows up to the monitor.
#[derive(Debug)]
pub struct DepositSubscription {
    receiver: mpsc::UnboundedReceiver<DepositEvent>,
}

impl DepositSubscription {
    /// Creates a subscription plus the sender half that feeds it.
    pub fn channel() -> (mpsc::UnboundedSender<DepositEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();

        (sender, Self { receiver })
    }
}

impl futures::Stream for DepositSubscription {
    type Item = DepositEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
