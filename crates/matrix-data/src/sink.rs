// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matrix_keymaster::KeymasterClient;
use matrix_sync::SemFifo;
use matrix_transport::{get_client_transport, release_client_transport, ClientTransport, Scheme, Urn};
use tracing::warn;

use crate::codec::Decode;
use crate::error::DataError;
use crate::selector::{SelectOnly, TransportSelector};

const DEFAULT_FIFO_CAPACITY: usize = 10;

/// A strongly-typed subscriber. Not connected at construction;
/// [`connect`][Self::connect] resolves the producer's configured URN
/// (via `Sel`), subscribes, and begins delivering decoded values into a
/// bounded FIFO.
pub struct DataSink<T: Decode, Sel: TransportSelector = SelectOnly> {
    fifo: Arc<SemFifo<T>>,
    blocking: bool,
    connection: Mutex<Option<Connection>>,
    lost_count: Arc<AtomicUsize>,
    _selector: PhantomData<Sel>,
}

struct Connection {
    transport: Arc<dyn ClientTransport>,
    urn: Urn,
    key: String,
}

impl<T: Decode + Send + 'static, Sel: TransportSelector> DataSink<T, Sel> {
    pub fn new(fifo_capacity: usize, blocking: bool) -> Self {
        Self {
            fifo: Arc::new(SemFifo::new(if fifo_capacity == 0 {
                DEFAULT_FIFO_CAPACITY
            } else {
                fifo_capacity
            })),
            blocking,
            connection: Mutex::new(None),
            lost_count: Arc::new(AtomicUsize::new(0)),
            _selector: PhantomData,
        }
    }

    /// Connects to the producer `component`'s `data_name` source.
    /// `transport_hint` is required by [`crate::SelectSpecified`] and
    /// ignored by [`SelectOnly`].
    pub fn connect(
        &self,
        km_url: &Urn,
        component: &str,
        data_name: &str,
        transport_hint: Option<Scheme>,
    ) -> Result<(), DataError> {
        let client = KeymasterClient::connect(km_url, false)?;

        let logical = client
            .get(&format!("components.{component}.Sources.{data_name}"))?
            .as_scalar()
            .ok_or_else(|| DataError::SelectionFailed(format!("Sources.{data_name} is not a scalar")))?
            .to_string();

        let configured_node =
            client.get(&format!("components.{component}.Transports.{logical}.AsConfigured"))?;
        let configured: Vec<Urn> = configured_node
            .as_sequence()
            .ok_or_else(|| {
                DataError::SelectionFailed(format!(
                    "Transports.{logical}.AsConfigured is not a sequence"
                ))
            })?
            .iter()
            .filter_map(|n| n.as_scalar())
            .filter_map(|s| Urn::parse(s).ok())
            .collect();

        let urn = Sel::select(&configured, transport_hint)?;
        let transport = get_client_transport(&urn)?;

        let key = format!("{component}.{data_name}");
        let fifo = self.fifo.clone();
        let blocking = self.blocking;
        let lost_count = self.lost_count.clone();

        transport.subscribe(
            &key,
            Box::new(move |_key, bytes| {
                let value = match T::decode(bytes) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "matrix-data: sink dropping mistyped frame");
                        return;
                    }
                };
                if blocking {
                    fifo.put(value);
                } else {
                    let dropped = fifo.put_no_block(value);
                    if dropped > 0 {
                        lost_count.fetch_add(dropped, Ordering::SeqCst);
                    }
                }
            }),
        )?;

        *self.connection.lock().unwrap() = Some(Connection {
            transport,
            urn,
            key,
        });
        Ok(())
    }

    pub fn connected_urn(&self) -> Option<Urn> {
        self.connection.lock().unwrap().as_ref().map(|c| c.urn.clone())
    }

    pub fn lost_count(&self) -> usize {
        self.lost_count.load(Ordering::SeqCst)
    }

    /// Blocks until a value is available, or returns `None` if the sink is
    /// disconnected (or dropped) while waiting.
    pub fn get(&self) -> Option<T> {
        self.fifo.get()
    }

    pub fn try_get(&self) -> Option<T> {
        self.fifo.try_get()
    }

    pub fn timed_get(&self, timeout: Duration) -> Option<T> {
        self.fifo.timed_get(timeout)
    }

    /// Unsubscribes, flushes the FIFO, and releases the transport
    /// reference.
    pub fn disconnect(&self) -> Result<(), DataError> {
        let Some(connection) = self.connection.lock().unwrap().take() else {
            return Ok(());
        };
        connection.transport.unsubscribe(&connection.key)?;
        self.fifo.flush(self.fifo.capacity() as isize);
        release_client_transport(&connection.urn);
        Ok(())
    }

    pub(crate) fn fifo(&self) -> Arc<SemFifo<T>> {
        self.fifo.clone()
    }
}

impl<T: Decode, Sel: TransportSelector> Drop for DataSink<T, Sel> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.lock().unwrap().take() {
            let _ = connection.transport.unsubscribe(&connection.key);
            release_client_transport(&connection.urn);
        }
        self.fifo.release();
    }
}
