use cosmwasm_std::Uint128;
use hyperdrive_agents_chain::{BlockTag, ChainClient, ContractCaller, LogFilter, Token};
use hyperdrive_agents_types::{AssetId, AssetIdPrefix, BondPosition, EventLog, PoolEvent, PositionKind, Wallet};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::apply::replay;
use crate::error::{ReconcileError, Result, TokenMismatch};

/// Long and short token ids `address` has touched according to `events`
pub fn implied_token_ids(address: &str, events: &[EventLog]) -> BTreeSet<AssetId> {
    let mut ids = BTreeSet::new();
    for log in events {
        let id = match &log.event {
            PoolEvent::Trade { breakdown, .. } if breakdown.trader.eq_ignore_ascii_case(address) => breakdown.asset_id,
            PoolEvent::TransferSingle { from, to, asset_id, .. }
                if from.eq_ignore_ascii_case(address) || to.eq_ignore_ascii_case(address) =>
            {
                Some(*asset_id)
            }
            _ => None,
        };
        if let Some(id) = id.filter(|id| matches!(id.prefix(), AssetIdPrefix::Long | AssetIdPrefix::Short)) {
            ids.insert(id);
        }
    }
    ids
}

/// Read the wallet of `address` straight from token balances. Open share
/// prices are not recoverable from balances and are left at zero.
pub async fn wallet_from_chain(
    address: &str,
    chain: &dyn ChainClient,
    contract: &dyn ContractCaller,
    token_ids: &BTreeSet<AssetId>,
) -> Result<Wallet> {
    let pool = contract.address().to_string();
    let multi = |id: AssetId| Token::MultiToken {
        contract: pool.clone(),
        id,
    };

    let mut wallet = Wallet::new(address);
    wallet.base = chain
        .get_balance(address, &Token::Erc20(contract.base_token().to_string()), BlockTag::Latest)
        .await?;
    wallet.lp_tokens = chain.get_balance(address, &multi(AssetId::lp()), BlockTag::Latest).await?;
    wallet.withdrawal_shares = chain
        .get_balance(address, &multi(AssetId::withdrawal_share()), BlockTag::Latest)
        .await?;

    for id in token_ids {
        let balance = chain.get_balance(address, &multi(*id), BlockTag::Latest).await?;
        if balance.is_zero() {
            continue;
        }
        let (prefix, maturity) = id.decode();
        let position = BondPosition {
            balance,
            maturity_time: maturity,
            open_share_price: Decimal::ZERO,
        };
        match prefix {
            AssetIdPrefix::Long => wallet.longs.insert(maturity, position),
            AssetIdPrefix::Short => wallet.shorts.insert(maturity, position),
            _ => None,
        };
    }
    Ok(wallet)
}

/// Per-token balance differences between two views of one wallet.
/// Open share prices are not compared.
pub fn diff(expected: &Wallet, actual: &Wallet) -> Vec<TokenMismatch> {
    let mut mismatches = Vec::new();
    let mut check = |kind: PositionKind, maturity_time: Option<u64>, e: Uint128, a: Uint128| {
        if e != a {
            mismatches.push(TokenMismatch {
                kind,
                maturity_time,
                expected: e,
                actual: a,
            });
        }
    };

    check(PositionKind::Base, None, expected.base, actual.base);
    check(PositionKind::Lp, None, expected.lp_tokens, actual.lp_tokens);
    check(
        PositionKind::WithdrawalShare,
        None,
        expected.withdrawal_shares,
        actual.withdrawal_shares,
    );
    for (kind, e_book, a_book) in [
        (PositionKind::Long, &expected.longs, &actual.longs),
        (PositionKind::Short, &expected.shorts, &actual.shorts),
    ] {
        let maturities: BTreeSet<u64> = e_book.keys().chain(a_book.keys()).copied().collect();
        for maturity in maturities {
            let balance = |book: &std::collections::BTreeMap<u64, BondPosition>| {
                book.get(&maturity).map(|p| p.balance).unwrap_or_default()
            };
            check(kind, Some(maturity), balance(e_book), balance(a_book));
        }
    }
    mismatches
}

/// Three-way check of an incrementally maintained wallet against a replay of
/// its event history and against on-chain balances
pub struct WalletReconciler {
    chain: Arc<dyn ChainClient>,
    contract: Arc<dyn ContractCaller>,
}

impl WalletReconciler {
    pub fn new(chain: Arc<dyn ChainClient>, contract: Arc<dyn ContractCaller>) -> Self {
        Self { chain, contract }
    }

    /// Every decoded pool and base token event from genesis
    pub async fn fetch_events(&self) -> Result<Vec<EventLog>> {
        let filter = LogFilter {
            addresses: vec![self.contract.address().to_string(), self.contract.base_token().to_string()],
            from_block: 0,
            to_block: None,
        };
        let logs = self.chain.get_logs(&filter).await?;
        Ok(self.contract.decode_events(&logs)?)
    }

    pub async fn replay(&self, address: &str) -> Result<Wallet> {
        let events = self.fetch_events().await?;
        replay(address, &events)
    }

    /// Returns the on-chain wallet when all three views agree
    pub async fn verify(&self, wallet: &Wallet) -> Result<Wallet> {
        let address = wallet.address.as_str();
        let events = self.fetch_events().await?;

        let replayed = replay(address, &events)?;
        let mismatches = diff(wallet, &replayed);
        if !mismatches.is_empty() {
            warn!(account = %address, count = mismatches.len(), "incremental wallet disagrees with replay");
            return Err(ReconcileError::Mismatch {
                address: address.to_string(),
                source_name: "event replay".to_string(),
                mismatches,
            });
        }

        let ids = implied_token_ids(address, &events);
        let on_chain = wallet_from_chain(address, self.chain.as_ref(), self.contract.as_ref(), &ids).await?;
        let mismatches = diff(wallet, &on_chain);
        if !mismatches.is_empty() {
            warn!(account = %address, count = mismatches.len(), "incremental wallet disagrees with chain");
            return Err(ReconcileError::Mismatch {
                address: address.to_string(),
                source_name: "chain balances".to_string(),
                mismatches,
            });
        }

        debug!(account = %address, tokens = ids.len(), "wallet reconciled");
        Ok(on_chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_receipt;
    use hyperdrive_agents_chain::{ContractCall, SimPoolParams, SimulatedChain};
    use hyperdrive_agents_types::{fixed::units, ActionType};

    const TRADER: &str = "0x000000000000000000000000000000000000b0b0";

    #[test]
    fn test_diff_reports_each_token() {
        let mut a = Wallet::new("0xabc").with_base(units(10));
        let b = Wallet::new("0xabc");
        a.longs.insert(
            50,
            BondPosition {
                balance: units(1),
                maturity_time: 50,
                open_share_price: Decimal::ONE,
            },
        );

        let mismatches = diff(&a, &b);
        assert_eq!(mismatches.len(), 2);
        assert_eq!(mismatches[1].kind, PositionKind::Long);
        assert_eq!(mismatches[1].maturity_time, Some(50));
        assert!(diff(&a, &a).is_empty());
    }

    #[tokio::test]
    async fn test_three_way_agreement_on_simulated_chain() {
        let chain = SimulatedChain::new(31337, 1_700_000_000);
        let pool = chain.deploy_pool(TRADER, SimPoolParams::default());
        chain.mint_base(pool.base_token(), TRADER, units(500)).unwrap();

        let mut wallet = Wallet::new(TRADER).with_base(units(500));
        let approve = ContractCall::Approve {
            spender: pool.address().to_string(),
            amount: Uint128::MAX,
        };
        chain.send_transaction(pool.encode(&approve, TRADER).unwrap()).await.unwrap();
        let open = ContractCall::OpenShort {
            bond_amount: units(50),
            max_deposit: Uint128::MAX,
            min_vault_share_price: Decimal::ZERO,
        };
        let hash = chain.send_transaction(pool.encode(&open, TRADER).unwrap()).await.unwrap();
        let receipt = chain.get_transaction_receipt(&hash).await.unwrap().unwrap();
        let breakdown = pool.decode_receipt(ActionType::OpenShort, &receipt).unwrap();
        apply_receipt(&mut wallet, ActionType::OpenShort, &breakdown).unwrap();
        // The deployer also holds the initial LP
        wallet.lp_tokens = SimPoolParams::default().initial_liquidity;

        let reconciler = WalletReconciler::new(Arc::new(chain.clone()), Arc::new(pool));
        let on_chain = reconciler.verify(&wallet).await.unwrap();
        assert_eq!(on_chain.shorts.len(), 1);

        wallet.base += Uint128::new(1);
        let err = reconciler.verify(&wallet).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Mismatch { .. }));
    }
}
