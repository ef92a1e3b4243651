//! NMOS IS-05 connection boundary
//!
//! The HTTP control plane lives outside the core; what crosses this
//! boundary is a staged set of transport parameters and an activation.
//! The core treats only the Active transition as an order to connect the
//! receiver and start it.


use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::receiver::Receiver;
use crate::state::ConnectionState;

fn default_true() -> bool {
    true
}

/// IS-05 transport parameters for an RTP receiver leg
///
/// FEC and RTCP fields are carried for schema completeness; the core
/// parses and ignores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportParams {
    /// Unicast source address filter
    pub source_ip: String,
    /// Multicast group to join
    pub multicast_ip: String,
    /// Local interface for the join
    pub interface_ip: String,
    /// RTP destination port
    pub destination_port: u16,
    /// RTP source port (informational)
    pub source_port: u16,
    /// Whether the RTP leg is enabled
    #[serde(default = "default_true")]
    pub rtp_enabled: bool,
    /// FEC toggle, ignored
    pub fec_enabled: String,
    /// FEC destination, ignored
    pub fec_destination_ip: String,
    /// FEC mode, ignored
    pub fec_mode: String,
    /// FEC 1D port, ignored
    pub fec_1d_destination_port: u16,
    /// FEC 2D port, ignored
    pub fec_2d_destination_port: u16,
    /// RTCP toggle, ignored
    pub rtcp_enabled: String,
    /// RTCP destination, ignored
    pub rtcp_destination_ip: String,
    /// RTCP port, ignored
    pub rtcp_destination_port: u16,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            source_ip: String::new(),
            multicast_ip: String::new(),
            interface_ip: String::new(),
            destination_port: 0,
            source_port: 0,
            rtp_enabled: true,
            fec_enabled: String::new(),
            fec_destination_ip: String::new(),
            fec_mode: String::new(),
            fec_1d_destination_port: 0,
            fec_2d_destination_port: 0,
            rtcp_enabled: String::new(),
            rtcp_destination_ip: String::new(),
            rtcp_destination_port: 0,
        }
    }
}

impl TransportParams {
    /// The stream source address: multicast group when set, unicast
    /// source otherwise
    #[must_use]
    pub fn source_address(&self) -> Option<&str> {
        if !self.multicast_ip.is_empty() {
            Some(&self.multicast_ip)
        } else if !self.source_ip.is_empty() {
            Some(&self.source_ip)
        } else {
            None
        }
    }
}

/// IS-05 connection request as staged by the control layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionRequest {
    /// Sender resource being connected from
    pub sender_id: String,
    /// Receiver resource being connected to
    pub receiver_id: String,
    /// Master enable for the connection
    #[serde(default = "default_true")]
    pub master_enable: bool,
    /// IS-05 activation mode string
    pub activation_mode: String,
    /// Transport parameters for the RTP leg
    pub transport_params: TransportParams,
    /// Transport file content (SDP), preferred over bare parameters
    pub transport_file: String,
    /// Transport file MIME type
    pub transport_file_type: String,
}

impl Default for ConnectionRequest {
    fn default() -> Self {
        Self {
            sender_id: String::new(),
            receiver_id: String::new(),
            master_enable: true,
            activation_mode: "activate_immediate".to_string(),
            transport_params: TransportParams::default(),
            transport_file: String::new(),
            transport_file_type: "application/sdp".to_string(),
        }
    }
}

/// Result of an activation
#[derive(Debug, Clone)]
pub struct ConnectionResponse {
    /// Whether activation succeeded
    pub success: bool,
    /// Failure description, empty on success
    pub error_message: String,
    /// Resulting connection state
    pub state: ConnectionState,
}

/// Staged/active connection tracking for one receiver
///
/// The control layer stages a request, then activates it; activation
/// translates into `connect` + `start` on the receiver. Deactivation
/// (master enable off) disconnects.
#[derive(Default)]
pub struct ConnectionStaging {
    staged: Option<ConnectionRequest>,
    active: Option<ConnectionRequest>,
    state: ConnectionState,
}

impl ConnectionStaging {
    /// Create an unconnected staging area
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The staged request, when one is pending
    #[must_use]
    pub fn staged(&self) -> Option<&ConnectionRequest> {
        self.staged.as_ref()
    }

    /// The active request, after a successful activation
    #[must_use]
    pub fn active(&self) -> Option<&ConnectionRequest> {
        self.active.as_ref()
    }

    /// Stage a connection request without applying it
    pub fn stage(&mut self, request: ConnectionRequest) {
        info!(
            "staged connection for receiver {} from sender {}",
            request.receiver_id, request.sender_id
        );
        self.staged = Some(request);
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Staged;
        }
    }

    /// Activate the staged request against `receiver`
    ///
    /// With master enable off the receiver is disconnected instead. The
    /// transport file wins over bare parameters when both are present.
    pub fn activate(&mut self, receiver: &mut Receiver) -> ConnectionResponse {
        let Some(request) = self.staged.take() else {
            return ConnectionResponse {
                success: false,
                error_message: "no staged connection".to_string(),
                state: self.state,
            };
        };

        if !request.master_enable {
            receiver.disconnect();
            self.active = None;
            self.state = ConnectionState::Disconnected;
            return ConnectionResponse {
                success: true,
                error_message: String::new(),
                state: self.state,
            };
        }

        let connected = if request.transport_file.is_empty() {
            let params = &request.transport_params;
            match params.source_address() {
                Some(source) => {
                    // Without a transport file the stream format is the
                    // AES67 default.
                    receiver.connect_to(
                        source,
                        params.destination_port,
                        crate::types::AudioFormat::default(),
                    )
                }
                None => Err(crate::error::Aes67Error::ConfigInvalid {
                    name: "transport_params".to_string(),
                    message: "neither multicast_ip nor source_ip given".to_string(),
                }),
            }
        } else {
            receiver.connect_sdp(&request.transport_file)
        };

        let result = connected.and_then(|()| receiver.start());
        match result {
            Ok(()) => {
                self.active = Some(request);
                self.state = ConnectionState::Active;
                ConnectionResponse {
                    success: true,
                    error_message: String::new(),
                    state: self.state,
                }
            }
            Err(e) => {
                warn!("activation failed: {e}");
                self.state = ConnectionState::Disconnected;
                ConnectionResponse {
                    success: false,
                    error_message: e.to_string(),
                    state: self.state,
                }
            }
        }
    }

    /// Disconnect the receiver and drop the active request
    pub fn deactivate(&mut self, receiver: &mut Receiver) {
        receiver.disconnect();
        self.active = None;
        self.state = ConnectionState::Disconnected;
    }
}
