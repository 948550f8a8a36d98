use std::sync::Arc;
use std::time::{Duration, Instant};

use cosmwasm_std::Uint128;
use futures::future::join_all;
use hyperdrive_agents_chain::{
    BlockTag, ChainClient, ChainError, ContractCall, ContractCaller, TransactionRequest, TxReceipt,
};
use hyperdrive_agents_metrics::{MetricsCollector, TradeBatchSpan};
use hyperdrive_agents_types::{FailureCause, TradeFailure, TradeIntent, TradeResult, Wallet};
use rand::RngCore;
use tracing::{debug, error, info, warn, Instrument};

use crate::calls::{needs_preview, protected_call, unprotected_call};
use crate::classifier::ErrorClassifier;
use crate::config::{CrashReportConfig, ExecutorConfig};
use crate::crash::CrashReporter;
use crate::error::{ExecutionError, Result};
use crate::liquidate::liquidation_intents;
use crate::validator::IntentValidator;

const OUT_OF_GAS: &str = "out of gas";
const TRANSFER_GAS: u64 = 21_000;

/// Submits batches of intents from one account with consecutive nonces
#[derive(Clone)]
pub struct TradeExecutor {
    chain: Arc<dyn ChainClient>,
    contract: Arc<dyn ContractCaller>,
    validator: IntentValidator,
    classifier: ErrorClassifier,
    reporter: Arc<CrashReporter>,
    config: ExecutorConfig,
    metrics: MetricsCollector,
}

impl TradeExecutor {
    pub fn new(chain: Arc<dyn ChainClient>, contract: Arc<dyn ContractCaller>) -> Self {
        Self {
            classifier: ErrorClassifier::new(chain.clone(), contract.clone()),
            reporter: Arc::new(CrashReporter::new(contract.clone(), CrashReportConfig::default())),
            validator: IntentValidator::new(),
            config: ExecutorConfig::default(),
            metrics: MetricsCollector::new(),
            chain,
            contract,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: CrashReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn contract(&self) -> &Arc<dyn ContractCaller> {
        &self.contract
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `intents` from `account`. Results come back in input order,
    /// one per intent; only local validation and the nonce read fail the
    /// whole call.
    pub async fn execute(&self, intents: Vec<TradeIntent>, account: &str) -> Result<Vec<TradeResult>> {
        self.run_batch(intents, account, None).await
    }

    /// Like [`execute`](Self::execute) with `wallet` attached to crash reports
    pub async fn execute_for(&self, intents: Vec<TradeIntent>, wallet: &Wallet) -> Result<Vec<TradeResult>> {
        self.run_batch(intents, &wallet.address, Some(wallet)).await
    }

    /// Close everything `wallet` holds. See [`liquidation_intents`].
    pub async fn liquidate<R: RngCore + Send + ?Sized>(
        &self,
        wallet: &Wallet,
        rng: Option<&mut R>,
    ) -> Result<Vec<TradeResult>> {
        let minimum = self.contract.pool_config().await?.minimum_transaction_amount;
        let intents = liquidation_intents(wallet, minimum, rng);
        info!(account = %wallet.address, trades = intents.len(), "liquidating wallet");
        self.run_batch(intents, &wallet.address, Some(wallet)).await
    }

    /// Approve the pool to spend all of `account`'s base
    pub async fn approve_max(&self, account: &str) -> Result<TxReceipt> {
        let call = ContractCall::Approve {
            spender: self.contract.address().to_string(),
            amount: Uint128::MAX,
        };
        self.submit_and_wait(&call, account).await
    }

    /// Send one non-trade call with a freshly read nonce and wait for it
    pub async fn submit_and_wait(&self, call: &ContractCall, account: &str) -> Result<TxReceipt> {
        submit_and_wait(self.chain.as_ref(), self.contract.as_ref(), call, account, &self.config).await
    }

    async fn run_batch(
        &self,
        intents: Vec<TradeIntent>,
        account: &str,
        wallet: Option<&Wallet>,
    ) -> Result<Vec<TradeResult>> {
        if let Err((index, source)) = self.validator.validate_all(&intents) {
            warn!(account = %account, index, error = %source, "intent failed local validation");
            return Err(ExecutionError::LocalValidation { index, source });
        }
        if intents.is_empty() {
            return Ok(Vec::new());
        }

        let batch = TradeBatchSpan::new(account, intents.len());
        let span = batch.span();
        async move {
            let base = pending_nonce(self.chain.as_ref(), account, &self.config).await?;
            info!(account = %account, base_nonce = base, trades = intents.len(), "dispatching trades");

            let handles: Vec<_> = intents
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, intent)| {
                    let this = self.clone();
                    let account = account.to_string();
                    let wallet = wallet.cloned();
                    let nonce = base + i as u64;
                    tokio::spawn(
                        async move { this.submit_intent(intent, account, nonce, wallet).await }
                            .instrument(tracing::Span::current()),
                    )
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for ((i, intent), joined) in intents.into_iter().enumerate().zip(join_all(handles).await) {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        let nonce = base + i as u64;
                        error!(account = %account, nonce, error = %e, "trade task did not complete");
                        let failure = TradeFailure::new(FailureCause::Unknown, format!("trade task failed: {e}"));
                        let mut result = TradeResult::failed(intent, account, failure).with_nonce(nonce);
                        result.crash_report_id = self.reporter.report(&result, wallet).await;
                        self.metrics
                            .record_trade_result(result.intent.action.action_type(), result.cause(), Duration::ZERO);
                        result
                    }
                };
                results.push(result);
            }
            Ok(results)
        }
        .instrument(span)
        .await
    }

    async fn submit_intent(
        &self,
        intent: TradeIntent,
        account: String,
        nonce: u64,
        wallet: Option<Wallet>,
    ) -> TradeResult {
        let started = Instant::now();
        let action = intent.action.action_type();

        let mut result = self.attempt(intent, &account, nonce).await;
        if !result.is_success() {
            self.classifier.classify(&mut result).await;
            result.crash_report_id = self.reporter.report(&result, wallet.as_ref()).await;
            warn!(
                account = %account,
                nonce,
                action = ?action,
                cause = ?result.cause(),
                "trade failed"
            );
        } else {
            info!(account = %account, nonce, action = ?action, block = ?result.block_number, "trade settled");
        }
        self.metrics.record_trade_result(action, result.cause(), started.elapsed());
        result
    }

    async fn attempt(&self, intent: TradeIntent, account: &str, nonce: u64) -> TradeResult {
        let action = intent.action.action_type();
        let fail = |intent: TradeIntent, failure: TradeFailure| TradeResult::failed(intent, account, failure).with_nonce(nonce);

        let preview = if needs_preview(&intent) {
            match self.contract.preview(&unprotected_call(&intent.action), account).await {
                Ok(preview) => Some(preview),
                Err(e) => {
                    debug!(account = %account, nonce, action = ?action, error = %e, "preview failed, submitting unprotected");
                    None
                }
            }
        } else {
            None
        };

        let gas_limit = intent.gas_limit.unwrap_or(self.config.default_gas_limit);
        let call = protected_call(&intent, preview.as_ref());
        let tx = match self.contract.encode(&call, account) {
            Ok(tx) => tx.with_nonce(nonce).with_gas_limit(Some(gas_limit)),
            Err(e) => {
                self.fill_nonce(account, nonce).await;
                return fail(intent, TradeFailure::new(FailureCause::Unknown, e.to_string()));
            }
        };

        self.metrics.record_trade_submitted(action);
        debug!(account = %account, nonce, action = ?action, gas_limit, "submitting trade");
        let hash = match self.chain.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(e) => {
                // Any other rejection leaves the nonce unused and later
                // intents of the batch queued behind it
                if !matches!(e, ChainError::NonceTooLow { .. }) {
                    self.fill_nonce(account, nonce).await;
                }
                return fail(intent, send_failure(&e));
            }
        };

        let receipt = match wait_for_receipt(self.chain.as_ref(), &hash, &self.config).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let cause = match e {
                    ExecutionError::ReceiptTimeout { .. } => FailureCause::Timeout,
                    _ => FailureCause::Unknown,
                };
                return fail(intent, TradeFailure::new(cause, e.to_string())).with_transaction_hash(Some(hash));
            }
        };

        if !receipt.is_success() {
            let failure = revert_failure(&receipt, gas_limit);
            let mut result = fail(intent, failure).with_transaction_hash(Some(hash));
            result.block_number = Some(receipt.block_number);
            return result;
        }

        match self.contract.decode_receipt(action, &receipt) {
            Ok(breakdown) => TradeResult::success(intent, account, nonce, hash, receipt.block_number, breakdown),
            Err(e) => {
                let mut result = fail(intent, TradeFailure::new(FailureCause::Unknown, e.to_string()))
                    .with_transaction_hash(Some(hash));
                result.block_number = Some(receipt.block_number);
                result
            }
        }
    }

    /// Spend `nonce` on an empty self-transfer so the rest of the batch
    /// is not stuck behind it
    async fn fill_nonce(&self, account: &str, nonce: u64) {
        let tx = TransactionRequest::new(account, account, Vec::new())
            .with_nonce(nonce)
            .with_gas_limit(Some(TRANSFER_GAS));
        let mut backoff = self.config.poll_backoff();
        match backoff
            .retry(self.config.nonce_read_attempts, || self.chain.send_transaction(tx.clone()))
            .await
        {
            Ok(hash) => warn!(account = %account, nonce, transaction_hash = %hash, "filled unused nonce"),
            Err(e) => error!(account = %account, nonce, error = %e, "could not fill unused nonce"),
        }
    }
}

fn send_failure(err: &ChainError) -> TradeFailure {
    TradeFailure::new(FailureCause::Unknown, err.to_string()).with_revert_reason(err.revert_reason().map(String::from))
}

fn revert_failure(receipt: &TxReceipt, gas_limit: u64) -> TradeFailure {
    let out_of_gas = receipt.revert_reason.as_deref() == Some(OUT_OF_GAS) || receipt.gas_used >= gas_limit;
    let cause = if out_of_gas {
        FailureCause::OutOfGas
    } else if receipt.revert_reason.is_none() {
        FailureCause::UnknownChainError
    } else {
        FailureCause::Unknown
    };
    let exception = format!(
        "transaction {} reverted: {}",
        receipt.transaction_hash,
        receipt.revert_reason.as_deref().unwrap_or("no reason")
    );
    TradeFailure::new(cause, exception).with_revert_reason(receipt.revert_reason.clone())
}

/// Pending transaction count, retried on transport errors
pub async fn pending_nonce(chain: &dyn ChainClient, account: &str, config: &ExecutorConfig) -> Result<u64> {
    let mut backoff = config.poll_backoff();
    Ok(backoff
        .retry(config.nonce_read_attempts, || {
            chain.get_transaction_count(account, BlockTag::Pending)
        })
        .await?)
}

/// Poll for a receipt until it arrives or `receipt_timeout` passes
pub async fn wait_for_receipt(chain: &dyn ChainClient, hash: &str, config: &ExecutorConfig) -> Result<TxReceipt> {
    let mut backoff = config.poll_backoff();
    let poll = async {
        loop {
            match chain.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    debug!(transaction_hash = %hash, error = %e, "receipt poll failed, retrying");
                }
                Err(e) => return Err(ExecutionError::Chain(e)),
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    };
    tokio::time::timeout(config.receipt_timeout, poll)
        .await
        .map_err(|_| ExecutionError::ReceiptTimeout {
            transaction_hash: hash.to_string(),
            waited_ms: config.receipt_timeout.as_millis() as u64,
        })?
}

/// Fresh nonce read, send, await receipt. Reverts are errors.
pub async fn submit_and_wait(
    chain: &dyn ChainClient,
    contract: &dyn ContractCaller,
    call: &ContractCall,
    account: &str,
    config: &ExecutorConfig,
) -> Result<TxReceipt> {
    let nonce = pending_nonce(chain, account, config).await?;
    let tx = contract
        .encode(call, account)?
        .with_nonce(nonce)
        .with_gas_limit(Some(config.default_gas_limit));
    let hash = chain.send_transaction(tx).await?;
    let receipt = wait_for_receipt(chain, &hash, config).await?;
    if !receipt.is_success() {
        return Err(ExecutionError::Reverted {
            transaction_hash: hash,
            reason: receipt.revert_reason.unwrap_or_else(|| "no reason".to_string()),
        });
    }
    debug!(account = %account, nonce, transaction_hash = %hash, "call mined");
    Ok(receipt)
}
