//! Traits for the RPC server.

use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use trestle_primitives::types::{Address, DepositId};

use crate::types::{RpcBridgeStats, RpcDeposit, RpcDepositPage, RpcQueueCounts};

/// RPCs related to information about the relay process itself.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "trestle"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "trestle"))]
pub trait TrestleControlApi {
    /// Get the uptime for the client in seconds assuming the clock is strictly monotonically
    /// increasing.
    #[method(name = "uptime")]
    async fn get_uptime(&self) -> RpcResult<u64>;
}

/// RPCs that allow monitoring deposits as they move through the pipeline, plus
/// aggregate views of the store and the job queue.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "trestle"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "trestle"))]
pub trait TrestleMonitoringApi {
    /// Get a deposit record by its chain-assigned id.
    #[method(name = "depositInfo")]
    async fn get_deposit_info(&self, deposit_id: DepositId) -> RpcResult<Option<RpcDeposit>>;

    /// Get one page of a user's deposits, newest first.
    ///
    /// `page` defaults to the first page and `page_size` to the server default
    /// when omitted.
    #[method(name = "depositsByUser")]
    async fn get_deposits_by_user(
        &self,
        user: Address,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> RpcResult<RpcDepositPage>;

    /// Get aggregate deposit counts, the completed volume and the monitor's
    /// view of the source chain.
    #[method(name = "bridgeStats")]
    async fn get_bridge_stats(&self) -> RpcResult<RpcBridgeStats>;

    /// Get a snapshot of the relay job queue.
    #[method(name = "queueCounts")]
    async fn get_queue_counts(&self) -> RpcResult<RpcQueueCounts>;
}

/// RPCs for operator intervention on individual deposits.
///
/// Both calls reject ids in statuses they do not apply to, so an operator can
/// never yank a deposit out from under a live relay attempt.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "trestleadmin"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "trestleadmin"))]
pub trait TrestleAdminApi {
    /// Return a failed deposit to pending, clear its retry bookkeeping and
    /// schedule an immediate relay attempt.
    #[method(name = "retryDeposit")]
    async fn retry_deposit(&self, deposit_id: DepositId) -> RpcResult<()>;

    /// Withdraw a pending or failed deposit from the pipeline.
    #[method(name = "cancelDeposit")]
    async fn cancel_deposit(&self, deposit_id: DepositId) -> RpcResult<()>;
}
