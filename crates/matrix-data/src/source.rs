// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;
use std::sync::Arc;

use matrix_keymaster::KeymasterClient;
use matrix_keystore::Node;
use matrix_transport::{get_server_transport, Scheme, ServerKey, ServerTransport, Urn};

use crate::codec::Encode;
use crate::error::DataError;

/// A strongly-typed publisher. At construction it consults the Keymaster
/// for its logical transport key, binds (or joins) the corresponding
/// server transport, and writes the resulting `AsConfigured` URNs back so
/// sinks can discover them.
pub struct DataSource<T: Encode> {
    server: Arc<dyn ServerTransport>,
    server_key: ServerKey,
    publish_key: String,
    _marker: PhantomData<T>,
}

impl<T: Encode> DataSource<T> {
    pub fn new(km_url: &Urn, component: &str, data_name: &str) -> Result<Self, DataError> {
        let client = KeymasterClient::connect(km_url, false)?;

        let logical = client
            .get(&format!("components.{component}.Sources.{data_name}"))?
            .as_scalar()
            .ok_or_else(|| DataError::SelectionFailed(format!("Sources.{data_name} is not a scalar")))?
            .to_string();

        let schemes_node = client.get(&format!(
            "components.{component}.Transports.{logical}.Specified"
        ))?;
        let schemes: Vec<Scheme> = schemes_node
            .as_sequence()
            .ok_or_else(|| {
                DataError::SelectionFailed(format!("Transports.{logical}.Specified is not a sequence"))
            })?
            .iter()
            .filter_map(|n| n.as_scalar())
            .filter_map(|s| Scheme::parse(s).ok())
            .collect();
        if schemes.is_empty() {
            return Err(DataError::SelectionFailed(format!(
                "Transports.{logical}.Specified named no usable scheme"
            )));
        }

        let partial_urns: Vec<Urn> = schemes.iter().map(|s| Urn::new(*s, "XXXXX")).collect();
        let server_key = ServerKey::new(component, &logical);
        let (server, bound) = get_server_transport(&server_key, schemes[0], &partial_urns)?;

        let as_configured = Node::Sequence(
            bound.iter().map(|u| Node::scalar(u.to_string())).collect(),
        );
        client.put(
            &format!("components.{component}.Transports.{logical}.AsConfigured"),
            as_configured,
            true,
        )?;

        Ok(Self {
            server,
            server_key,
            publish_key: format!("{component}.{data_name}"),
            _marker: PhantomData,
        })
    }

    pub fn publish(&self, value: &T) -> Result<(), DataError> {
        let bytes = value.encode();
        self.server.publish(&self.publish_key, &bytes)?;
        Ok(())
    }
}

impl<T: Encode> Drop for DataSource<T> {
    fn drop(&mut self) {
        matrix_transport::release_server_transport(&self.server_key);
    }
}
