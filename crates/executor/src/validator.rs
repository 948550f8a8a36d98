use hyperdrive_agents_types::{ActionType, MarketAction, TradeIntent};
use rust_decimal::Decimal;
use thiserror::Error;

/// Checks an intent can be encoded before any network call is made
#[derive(Debug, Clone, Default)]
pub struct IntentValidator;

impl IntentValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_intent(&self, intent: &TradeIntent) -> Result<(), ValidationError> {
        self.validate_maturity(intent)?;
        self.validate_apr_bounds(intent)?;
        self.validate_slippage(intent)?;
        Ok(())
    }

    /// Validate every intent, reporting the first failure with its index
    pub fn validate_all(&self, intents: &[TradeIntent]) -> Result<(), (usize, ValidationError)> {
        intents
            .iter()
            .enumerate()
            .try_for_each(|(i, intent)| self.validate_intent(intent).map_err(|e| (i, e)))
    }

    /// Closing a position names the maturity being closed
    pub fn validate_maturity(&self, intent: &TradeIntent) -> Result<(), ValidationError> {
        match &intent.action {
            MarketAction::CloseLong { maturity_time: None, .. }
            | MarketAction::CloseShort { maturity_time: None, .. } => Err(ValidationError::MissingMaturityTime {
                action: intent.action.action_type(),
            }),
            _ => Ok(()),
        }
    }

    pub fn validate_apr_bounds(&self, intent: &TradeIntent) -> Result<(), ValidationError> {
        let MarketAction::AddLiquidity { min_apr, max_apr, .. } = &intent.action else {
            return Ok(());
        };
        match (min_apr, max_apr) {
            (Some(min), Some(max)) if min > max => Err(ValidationError::InvertedAprBounds {
                min_apr: *min,
                max_apr: *max,
            }),
            (Some(_), Some(_)) => Ok(()),
            _ => Err(ValidationError::MissingAprBounds),
        }
    }

    pub fn validate_slippage(&self, intent: &TradeIntent) -> Result<(), ValidationError> {
        match intent.slippage_tolerance {
            Some(tolerance) if tolerance.is_sign_negative() || tolerance >= Decimal::ONE => {
                Err(ValidationError::SlippageOutOfRange { tolerance })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{action} requires a maturity time")]
    MissingMaturityTime { action: ActionType },

    #[error("ADD_LIQUIDITY requires both min_apr and max_apr")]
    MissingAprBounds,

    #[error("min_apr {min_apr} is above max_apr {max_apr}")]
    InvertedAprBounds { min_apr: Decimal, max_apr: Decimal },

    #[error("slippage tolerance {tolerance} is outside [0, 1)")]
    SlippageOutOfRange { tolerance: Decimal },
}
