//! Component self-description printed by `--json`.
//!
//! Flow-based runtimes discover components by running them with `--json`
//! and reading a registry entry that lists the component's ports.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PortSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub description: &'static str,
    pub elementary: bool,
    pub inports: Vec<PortSpec>,
    pub outports: Vec<PortSpec>,
}

impl RegistryEntry {
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Registry entry for `wsbridge-server`.
pub fn server_entry() -> RegistryEntry {
    entry(
        "WebSocket server: multiplexes many peers over one pair of ports using CID envelopes",
        "Listen address for the websocket server, e.g. localhost:9999",
        "JSON envelopes {cid, payload} to send to connected peers",
        "JSON envelopes {cid, payload} received from connected peers",
    )
}

/// Registry entry for `wsbridge-client`.
pub fn client_entry() -> RegistryEntry {
    entry(
        "WebSocket client: bridges one remote websocket endpoint to a pair of ports",
        "Websocket URL to dial, e.g. ws://localhost:9999/",
        "Raw data to send to the remote peer",
        "Raw data received from the remote peer",
    )
}

fn entry(
    description: &'static str,
    options: &'static str,
    input: &'static str,
    output: &'static str,
) -> RegistryEntry {
    RegistryEntry {
        description,
        elementary: true,
        inports: vec![
            PortSpec {
                name: "OPTIONS",
                kind: "string",
                description: options,
                required: true,
            },
            PortSpec {
                name: "IN",
                kind: "all",
                description: input,
                required: true,
            },
        ],
        outports: vec![PortSpec {
            name: "OUT",
            kind: "all",
            description: output,
            required: true,
        }],
    }
}
