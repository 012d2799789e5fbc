//! Value-changed notifications.
use bt_hci::param::ConnHandle;
use heapless::Vec;

use crate::attribute::AttributeValue;
use crate::radio::Radio;
use crate::Error;

/// What happened to a notification.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the radio for the connected central.
    Sent,
    /// No central connected; kept until the next connection.
    Queued,
}

/// Pushes notifications to the connected central and holds them while there is none.
///
/// Only the latest value per handle is held. `N` bounds the number of distinct
/// handles waiting.
pub struct NotificationDispatcher<const N: usize> {
    pending: Vec<(u16, AttributeValue), N>,
}

impl<const N: usize> Default for NotificationDispatcher<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NotificationDispatcher<N> {
    pub const fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn notify<R: Radio>(
        &mut self,
        radio: &mut R,
        conn: Option<ConnHandle>,
        handle: u16,
        value: &[u8],
    ) -> Result<Delivery, Error> {
        match conn {
            Some(conn) => {
                // A held value for this handle is older than the one being sent.
                self.pending.retain(|(h, _)| *h != handle);
                radio.notify(conn, handle, value).map_err(|_| {
                    warn!("[notify] handle {} to {:?} failed", handle, conn);
                    Error::Radio
                })?;
                trace!("[notify] handle {} sent {} bytes", handle, value.len());
                Ok(Delivery::Sent)
            }
            None => {
                let value = AttributeValue::from_slice(value).map_err(|_| Error::CapacityExceeded)?;
                if let Some((_, held)) = self.pending.iter_mut().find(|(h, _)| *h == handle) {
                    *held = value;
                } else {
                    self.pending.push((handle, value)).map_err(|_| Error::TableFull)?;
                }
                trace!("[notify] handle {} queued", handle);
                Ok(Delivery::Queued)
            }
        }
    }

    /// Deliver every held value to `conn`, oldest handle first.
    ///
    /// Values not delivered because the radio failed stay queued.
    pub fn flush<R: Radio>(&mut self, radio: &mut R, conn: ConnHandle) -> Result<usize, Error> {
        let mut sent = 0;
        let mut result = Ok(());
        for (handle, value) in self.pending.iter() {
            if radio.notify(conn, *handle, value).is_err() {
                warn!("[notify] flush of handle {} failed", handle);
                result = Err(Error::Radio);
                break;
            }
            sent += 1;
        }
        self.pending.rotate_left(sent);
        self.pending.truncate(self.pending.len() - sent);
        if sent > 0 {
            debug!("[notify] flushed {} held values", sent);
        }
        result.map(|_| sent)
    }

    /// Drop everything held.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Held values in queue order.
    pub fn pending(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        self.pending.iter().map(|(h, v)| (*h, &v[..]))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
