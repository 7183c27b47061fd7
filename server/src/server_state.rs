use taxi_dispatch_data_management::{compliance::ReporterHandle, DataManager};
use tokio::sync::broadcast;

use crate::auth::TokenSigner;

pub struct ServerState {
    // Channel used to publish presence-changed notifications to any
    // live-tracking subscribers. Only production is guaranteed here.
    pub tx: broadcast::Sender<String>,
    pub data_manager: DataManager,
    pub signer: TokenSigner,
    pub reporter: ReporterHandle,
}
