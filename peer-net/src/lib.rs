pub mod client;
pub mod endpoint;
pub mod host;
pub mod loopback;
pub mod player;

pub use client::SignalingClient;
pub use endpoint::{
    EndpointEvent, EndpointFactory, EndpointRole, PeerEndpoint, PeerError, PeerErrorKind,
};
pub use host::{HostConfig, HostConnectionManager, HostEvent, HostHandle};
pub use loopback::{LoopbackFactory, LoopbackNetwork};
pub use player::{PlayerConfig, PlayerConnectionManager, PlayerEvent, PlayerHandle};
