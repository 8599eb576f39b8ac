//! WebSocket implementations of the chain traits against bridge node RPCs.

use async_trait::async_trait;
use futures::StreamExt;
use jsonrpsee::{
    core::{
        client::{Subscription, SubscriptionClientT},
        RpcResult,
    },
    proc_macros::rpc,
    rpc_params,
    ws_client::{WsClient, WsClientBuilder},
};
use tracing::{debug, warn};
use trestle_primitives::{
    event::DepositEvent,
    job::RelayJob,
    types::{Address, BlockHeight, DepositId, TxHash},
};

use crate::{
    errors::{ClientError, ClientResult},
    subscription::DepositSubscription,
    traits::{DestinationChain, Receipt, SourceChain},
};

/// Method the source node pushes deposit events on.
const SUBSCRIBE_DEPOSITS: &str = "bridge_subscribeDeposits";

/// Method that tears the deposit feed down.
const UNSUBSCRIBE_DEPOSITS: &str = "bridge_unsubscribeDeposits";

/// The source-side bridge node API.
#[rpc(client, namespace = "bridge")]
pub trait SourceBridgeApi {
    /// The id of the chain the node is on.
    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<u64>;

    /// The current chain head height.
    #[method(name = "blockNumber")]
    async fn block_number(&self) -> RpcResult<u64>;

    /// Deposit events emitted in the inclusive block range.
    #[method(name = "depositEvents")]
    async fn deposit_events(&self, from: u64, to: u64) -> RpcResult<Vec<DepositEvent>>;
}

/// The destination-side bridge node API.
#[rpc(client, namespace = "bridge")]
pub trait DestBridgeApi {
    /// The id of the chain the node is on.
    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<u64>;

    /// Signs, submits and mines a native-asset release for a relay payload.
    #[method(name = "releaseNative")]
    async fn release_native(&self, job: RelayJob) -> RpcResult<RpcReceipt>;

    /// Signs, submits and mines a wrapped-token mint for a relay payload.
    #[method(name = "mintToken")]
    async fn mint_token(&self, token: Address, job: RelayJob) -> RpcResult<RpcReceipt>;

    /// The successful release transaction for a deposit id, if one landed.
    #[method(name = "completedRelease")]
    async fn completed_release(&self, deposit_id: DepositId) -> RpcResult<Option<TxHash>>;

    /// The account the node signs submissions with.
    #[method(name = "signerAddress")]
    async fn signer_address(&self) -> RpcResult<Address>;
}

/// Wire form of a submission receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RpcReceipt {
    /// Destination transaction hash.
    pub tx_hash: TxHash,

    /// Whether the transaction executed successfully.
    pub success: bool,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            success: receipt.success,
        }
    }
}

/// [`SourceChain`] over a WebSocket connection to a source bridge node.
#[derive(Debug)]
pub struct WsSourceClient {
    client: WsClient,
}

impl WsSourceClient {
    /// Connects to the node at `url`.
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let client = WsClientBuilder::default()
            .build(url)
            .await
            .map_err(ClientError::from)?;

        Ok(Self { client })
    }

    /// The chain id the node reports, for checking it against the deployment
    /// parameters.
    pub async fn chain_id(&self) -> ClientResult<u64> {
        Ok(SourceBridgeApiClient::chain_id(&self.client).await?)
    }
}

#[async_trait]
impl SourceChain for WsSourceClient {
    async fn block_height(&self) -> ClientResult<BlockHeight> {
        Ok(SourceBridgeApiClient::block_number(&self.client).await?)
    }

    async fn deposit_events(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> ClientResult<Vec<DepositEvent>> {
        Ok(SourceBridgeApiClient::deposit_events(&self.client, from, to).await?)
    }

    async fn subscribe_deposits(&self) -> ClientResult<DepositSubscription> {
        let mut subscription: Subscription<DepositEvent> = self
            .client
            .subscribe(SUBSCRIBE_DEPOSITS, rpc_params![], UNSUBSCRIBE_DEPOSITS)
            .await
            .map_err(ClientError::from)?;
        let (sender, feed) = DepositSubscription::channel();

        // Pump notifications into the feed until either side goes away. Dropping
        // the sender ends the feed, which the monitor reads as a disconnect.
        tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                match item {
                    Ok(event) => {
                        if sender.send(event).is_err() {
                            debug!("deposit feed consumer went away, dropping subscription");
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "deposit subscription yielded an undecodable item");
                        break;
                    }
                }
            }
        });

        Ok(feed)
    }
}

/// [`DestinationChain`] over a WebSocket connection to a destination bridge node.
#[derive(Debug)]
pub struct WsDestinationClient {
    client: WsClient,
    signer: Address,
}

impl WsDestinationClient {
    /// Connects to the node at `url` and resolves its signing account.
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let client = WsClientBuilder::default()
            .build(url)
            .await
            .map_err(ClientError::from)?;
        let signer = DestBridgeApiClient::signer_address(&client).await?;

        Ok(Self { client, signer })
    }

    /// The chain id the node reports, for checking it against the deployment
    /// parameters.
    pub async fn chain_id(&self) -> ClientResult<u64> {
        Ok(DestBridgeApiClient::chain_id(&self.client).await?)
    }
}

#[async_trait]
impl DestinationChain for WsDestinationClient {
    async fn release_native(&self, job: &RelayJob) -> ClientResult<Receipt> {
        let receipt = DestBridgeApiClient::release_native(&self.client, job.clone()).await?;

        Ok(receipt.into())
    }

    async fn mint_token(&self, token: Address, job: &RelayJob) -> ClientResult<Receipt> {
        let receipt = DestBridgeApiClient::mint_token(&self.client, token, job.clone()).await?;

        Ok(receipt.into())
    }

    async fn completed_release(&self, deposit_id: DepositId) -> ClientResult<Option<TxHash>> {
        Ok(DestBridgeApiClient::completed_release(&self.client, deposit_id).await?)
    }

    fn signer(&self) -> Address {
        self.signer
    }
}
