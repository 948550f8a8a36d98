use std::sync::Arc;

use cosmwasm_std::Uint128;
use hyperdrive_agents_chain::{BlockTag, ChainClient, ContractCaller, Token};
use hyperdrive_agents_types::{AssetId, FailureCause, MarketAction, TradeFailure, TradeResult};
use tracing::debug;

use crate::calls::unprotected_call;

const OUTPUT_LIMIT: &str = "OutputLimit";
const MIN_TXN_AMOUNT: &str = "MinimumTransactionAmount";

/// Assigns a cause to a failed trade by inspecting chain state. Read
/// failures become annotations; the intent is never touched.
///
/// Balances and allowances are read at the block the trade reverted in,
/// so trades mined later in the same batch do not change the verdict.
#[derive(Clone)]
pub struct ErrorClassifier {
    chain: Arc<dyn ChainClient>,
    contract: Arc<dyn ContractCaller>,
}

impl ErrorClassifier {
    pub fn new(chain: Arc<dyn ChainClient>, contract: Arc<dyn ContractCaller>) -> Self {
        Self { chain, contract }
    }

    /// Classify a FAIL result in place. SUCCESS results are left alone.
    pub async fn classify(&self, result: &mut TradeResult) {
        let Some(failure) = result.failure.as_mut() else {
            return;
        };
        let account = result.account.clone();
        let action = &result.intent.action;
        let tag = result.block_number.map_or(BlockTag::Latest, BlockTag::Number);

        // Causes detected where the failure happened
        if matches!(failure.cause, FailureCause::Timeout | FailureCause::OutOfGas) {
            return;
        }

        let cause = if let Some(note) = self.check_allowance(action, &account, tag, failure).await {
            failure.annotate(note);
            FailureCause::InsufficientAllowance
        } else if let Some(note) = self.check_balance(action, &account, tag, failure).await {
            failure.annotate(note);
            FailureCause::InvalidBalance
        } else if is_slippage(action, failure.revert_reason.as_deref()) {
            failure.annotate("output limit hit");
            FailureCause::Slippage
        } else if let Some(note) = self.check_min_txn(action, failure).await {
            failure.annotate(note);
            FailureCause::MinTxnAmount
        } else if failure.cause == FailureCause::UnknownChainError {
            FailureCause::UnknownChainError
        } else {
            FailureCause::Unknown
        };

        debug!(account = %account, action = ?action.action_type(), cause = %cause, "classified trade failure");
        failure.cause = cause;
    }

    async fn check_allowance(
        &self,
        action: &MarketAction,
        account: &str,
        tag: BlockTag,
        failure: &mut TradeFailure,
    ) -> Option<String> {
        let amount = match action {
            MarketAction::AddLiquidity { base, .. } | MarketAction::OpenLong { base } => *base,
            MarketAction::OpenShort { .. } => Uint128::one(),
            _ => return None,
        };
        match self.contract.allowance(account, tag).await {
            Ok(allowance) if allowance < amount => Some(format!("allowance {allowance} is below {amount}")),
            Ok(_) => None,
            Err(e) => {
                failure.annotate(format!("allowance read failed: {e}"));
                None
            }
        }
    }

    async fn check_balance(
        &self,
        action: &MarketAction,
        account: &str,
        tag: BlockTag,
        failure: &mut TradeFailure,
    ) -> Option<String> {
        let pool = self.contract.address().to_string();
        let (token, needed, label) = match action {
            MarketAction::OpenLong { base } | MarketAction::AddLiquidity { base, .. } => {
                (Token::Erc20(self.contract.base_token().to_string()), *base, "base")
            }
            MarketAction::CloseLong { bonds, maturity_time } => (
                Token::MultiToken {
                    contract: pool,
                    id: AssetId::long(maturity_time.unwrap_or_default()),
                },
                *bonds,
                "long",
            ),
            MarketAction::CloseShort { bonds, maturity_time } => (
                Token::MultiToken {
                    contract: pool,
                    id: AssetId::short(maturity_time.unwrap_or_default()),
                },
                *bonds,
                "short",
            ),
            MarketAction::RemoveLiquidity { lp_shares } => (
                Token::MultiToken {
                    contract: pool,
                    id: AssetId::lp(),
                },
                *lp_shares,
                "lp",
            ),
            MarketAction::OpenShort { .. } => {
                let deposit = match self.contract.preview(&unprotected_call(action), account).await {
                    Ok(preview) => preview.base_amount,
                    Err(e) => {
                        failure.annotate(format!("deposit preview failed: {e}"));
                        return None;
                    }
                };
                (Token::Erc20(self.contract.base_token().to_string()), deposit, "base")
            }
            MarketAction::RedeemWithdrawShare { .. } => return None,
        };

        match self.chain.get_balance(account, &token, tag).await {
            Ok(balance) if balance.is_zero() && label != "base" => {
                Some(format!("no {label} position held"))
            }
            Ok(balance) if balance < needed => Some(format!("{label} balance {balance} is below {needed}")),
            Ok(_) => None,
            Err(e) => {
                failure.annotate(format!("{label} balance read failed: {e}"));
                None
            }
        }
    }

    async fn check_min_txn(&self, action: &MarketAction, failure: &mut TradeFailure) -> Option<String> {
        if failure
            .revert_reason
            .as_deref()
            .is_some_and(|reason| reason.contains(MIN_TXN_AMOUNT))
        {
            return Some("pool rejected amount below minimum".to_string());
        }
        match self.contract.pool_config().await {
            Ok(config) if action.trade_amount() < config.minimum_transaction_amount => Some(format!(
                "amount {} is below minimum {}",
                action.trade_amount(),
                config.minimum_transaction_amount
            )),
            Ok(_) => None,
            Err(e) => {
                failure.annotate(format!("pool config read failed: {e}"));
                None
            }
        }
    }
}

fn is_slippage(action: &MarketAction, revert_reason: Option<&str>) -> bool {
    matches!(
        action,
        MarketAction::OpenLong { .. }
            | MarketAction::CloseLong { .. }
            | MarketAction::OpenShort { .. }
            | MarketAction::CloseShort { .. }
    ) && revert_reason.is_some_and(|reason| reason.contains(OUTPUT_LIMIT))
}
