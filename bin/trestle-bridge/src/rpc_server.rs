//! Bootstraps the RPC server for the relay node.

use std::{fmt, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonrpsee::{
    core::RpcResult,
    types::{ErrorCode, ErrorObjectOwned},
    RpcModule,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trestle_db::{
    deposits::DepositDb,
    persistent::{
        config::DbConfig,
        sqlite::{execute_with_retries, SqliteDb},
    },
};
use trestle_primitives::{
    deposit::Page,
    types::{Address, DepositId},
};
use trestle_relayer::{
    admin::{AdminOps, CancelOutcome, RetryOutcome},
    monitor::ObservedHead,
    queue::JobQueue,
};
use trestle_rpc::{
    traits::{TrestleAdminApiServer, TrestleControlApiServer, TrestleMonitoringApiServer},
    types::{RpcBridgeStats, RpcDeposit, RpcDepositPage, RpcQueueCounts},
};

/// Starts the RPC server and blocks until `shutdown` fires.
pub(crate) async fn start_rpc<T>(
    rpc_impl: &T,
    rpc_addr: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    T: TrestleControlApiServer
        + TrestleMonitoringApiServer
        + TrestleAdminApiServer
        + Clone
        + Sync
        + Send,
{
    let mut rpc_module = RpcModule::new(rpc_impl.clone());

    let control_api = TrestleControlApiServer::into_rpc(rpc_impl.clone());
    let monitoring_api = TrestleMonitoringApiServer::into_rpc(rpc_impl.clone());
    let admin_api = TrestleAdminApiServer::into_rpc(rpc_impl.clone());

    rpc_module.merge(control_api).context("merge control api")?;
    rpc_module
        .merge(monitoring_api)
        .context("merge monitoring api")?;
    rpc_module.merge(admin_api).context("merge admin api")?;

    info!("starting relay rpc server at {rpc_addr}");
    let rpc_server = jsonrpsee::server::ServerBuilder::new()
        .build(&rpc_addr)
        .await
        .context("build relay rpc server")?;

    let rpc_handle = rpc_server.start(rpc_module);
    debug!("relay rpc server started");

    shutdown.cancelled().await;
    info!("stopping rpc server");

    if rpc_handle.stop().is_err() {
        warn!("rpc server already stopped");
    }

    Ok(())
}

/// The RPC implementation over the relay's store, queue and intervention handles.
#[derive(Debug, Clone)]
pub(crate) struct BridgeRpc {
    /// When the server came up, used to compute the uptime.
    start_time: DateTime<Utc>,

    db: Arc<SqliteDb>,

    /// Retry policy applied to every read this server makes against the store.
    db_config: DbConfig,

    queue: JobQueue<SqliteDb>,

    admin: Arc<AdminOps<SqliteDb>>,

    observed_head: ObservedHead,
}

impl BridgeRpc {
    /// Builds the RPC implementation over the shared pipeline handles.
    pub(crate) fn new(
        db: Arc<SqliteDb>,
        db_config: DbConfig,
        queue: JobQueue<SqliteDb>,
        admin: Arc<AdminOps<SqliteDb>>,
        observed_head: ObservedHead,
    ) -> Self {
        Self {
            start_time: Utc::now(),
            db,
            db_config,
            queue,
            admin,
            observed_head,
        }
    }
}

#[async_trait]
impl TrestleControlApiServer for BridgeRpc {
    async fn get_uptime(&self) -> RpcResult<u64> {
        let current_time = Utc::now().timestamp();
        let start_time = self.start_time.timestamp();

        // The user might care about their system time being incorrect.
        if current_time <= start_time {
            return Err(rpc_error(
                ErrorCode::InternalError,
                "system time may be inaccurate", // `start_time` may have been incorrect too
                current_time.saturating_sub(start_time),
            ));
        }

        Ok(current_time.abs_diff(start_time))
    }
}

#[async_trait]
impl TrestleMonitoringApiServer for BridgeRpc {
    async fn get_deposit_info(&self, deposit_id: DepositId) -> RpcResult<Option<RpcDeposit>> {
        let deposit = execute_with_retries(&self.db_config, || async {
            self.db.deposit(deposit_id).await
        })
        .await
        .map_err(|err| {
            rpc_error(
                ErrorCode::InternalError,
                "failed to query deposit",
                err.to_string(),
            )
        })?;

        Ok(deposit.map(RpcDeposit::from))
    }

    async fn get_deposits_by_user(
        &self,
        user: Address,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> RpcResult<RpcDepositPage> {
        let page = Page::new(
            page.unwrap_or(0),
            page_size.unwrap_or(Page::DEFAULT_SIZE),
        );

        let deposits = execute_with_retries(&self.db_config, || async {
            self.db.deposits_by_user(&user, page).await
        })
        .await
        .map_err(|err| {
            rpc_error(
                ErrorCode::InternalError,
                "failed to list deposits",
                err.to_string(),
            )
        })?;

        Ok(RpcDepositPage {
            deposits: deposits.into_iter().map(RpcDeposit::from).collect(),
            page: page.number,
            page_size: page.size,
        })
    }

    async fn get_bridge_stats(&self) -> RpcResult<RpcBridgeStats> {
        let stats = execute_with_retries(&self.db_config, || async {
            self.db.deposit_stats().await
        })
        .await
        .map_err(|err| {
            rpc_error(
                ErrorCode::InternalError,
                "failed to aggregate deposit stats",
                err.to_string(),
            )
        })?;

        Ok(RpcBridgeStats::new(&stats, self.observed_head.get()))
    }

    async fn get_queue_counts(&self) -> RpcResult<RpcQueueCounts> {
        let counts = execute_with_retries(&self.db_config, || async { self.queue.counts().await })
            .await
            .map_err(|err| {
                rpc_error(
                    ErrorCode::InternalError,
                    "failed to count queue jobs",
                    err.to_string(),
                )
            })?;

        Ok(counts.into())
    }
}

#[async_trait]
impl TrestleAdminApiServer for BridgeRpc {
    async fn retry_deposit(&self, deposit_id: DepositId) -> RpcResult<()> {
        let outcome = self.admin.retry_deposit(deposit_id).await.map_err(|err| {
            rpc_error(
                ErrorCode::InternalError,
                "failed to retry deposit",
                err.to_string(),
            )
        })?;

        match outcome {
            RetryOutcome::Scheduled => Ok(()),
            RetryOutcome::NotFailed { actual } => Err(rpc_error(
                ErrorCode::InvalidRequest,
                "only failed deposits can be retried",
                actual,
            )),
            RetryOutcome::NotFound => Err(rpc_error(
                ErrorCode::InvalidRequest,
                "deposit not found",
                deposit_id,
            )),
        }
    }

    async fn cancel_deposit(&self, deposit_id: DepositId) -> RpcResult<()> {
        let outcome = self.admin.cancel_deposit(deposit_id).await.map_err(|err| {
            rpc_error(
                ErrorCode::InternalError,
                "failed to cancel deposit",
                err.to_string(),
            )
        })?;

        match outcome {
            CancelOutcome::Cancelled => Ok(()),
            CancelOutcome::NotCancellable { actual } => Err(rpc_error(
                ErrorCode::InvalidRequest,
                "deposit is past the point of cancellation",
                actual,
            )),
            CancelOutcome::NotFound => Err(rpc_error(
                ErrorCode::InvalidRequest,
                "deposit not found",
                deposit_id,
            )),
        }
    }
}

/// Returns an [`ErrorObjectOwned`] with the given code, message, and data.
/// Useful for creating custom error objects in RPC responses.
fn rpc_error<T: fmt::Display + Serialize>(
    err_code: ErrorCode,
    message: &str,
    data: T,
) -> ErrorObjectOwned {
    ErrorObjectOwned::owned::<_>(err_code.code(), message, Some(data))
}
