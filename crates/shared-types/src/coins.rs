//! # Coins
//!
//! Integer coin amounts (`Coin`, `Coins`) and decimal amounts used by reward
//! accounting (`DecCoin`, `DecCoins`). Collections are kept sorted by denom
//! with zero amounts removed, so equal balances always compare and encode
//! equal.

use crate::dec::{checked_mul_div, Dec};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

fn valid_denom(denom: &str) -> bool {
    let len = denom.len();
    (2..=16).contains(&len)
        && denom.starts_with(|c: char| c.is_ascii_lowercase())
        && denom
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn split_amount(s: &str) -> Option<(&str, &str)> {
    let idx = s.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (amount, denom) = s.split_at(idx);
    if amount.is_empty() {
        return None;
    }
    Some((amount, denom))
}

// =============================================================================
// INTEGER COINS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// The `num / den` share of this coin, truncated. `None` when `den` is
    /// zero or the share does not fit.
    pub fn checked_mul_ratio(&self, num: u128, den: u128) -> Option<Coin> {
        checked_mul_div(self.amount, num, den).map(|amount| Coin::new(self.denom.clone(), amount))
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (amount, denom) = split_amount(s).ok_or_else(|| format!("invalid coin {s}"))?;
        if !valid_denom(denom) {
            return Err(format!("invalid denom in {s}"));
        }
        let amount = amount
            .parse::<u128>()
            .map_err(|e| format!("invalid coin amount {s}: {e}"))?;
        Ok(Coin::new(denom, amount))
    }
}

impl Serialize for Coin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Coin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A normalized multi-denom balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Merges duplicate denoms, drops zero amounts and sorts by denom.
    pub fn new(coins: Vec<Coin>) -> Self {
        let mut merged: std::collections::BTreeMap<String, u128> = Default::default();
        for coin in coins {
            *merged.entry(coin.denom).or_default() += coin.amount;
        }
        Self(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn single(denom: impl Into<String>, amount: u128) -> Self {
        Self::new(vec![Coin::new(denom, amount)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    pub fn plus(&self, other: &Coins) -> Coins {
        Coins::new(self.0.iter().chain(other.0.iter()).cloned().collect())
    }

    /// `None` when any denom would go negative.
    pub fn checked_minus(&self, other: &Coins) -> Option<Coins> {
        let mut out = Vec::with_capacity(self.0.len());
        for coin in &self.0 {
            let sub = other.amount_of(&coin.denom);
            out.push(Coin::new(coin.denom.clone(), coin.amount.checked_sub(sub)?));
        }
        for coin in &other.0 {
            if coin.amount > 0 && self.amount_of(&coin.denom) == 0 {
                return None;
            }
        }
        Some(Coins::new(out))
    }

    pub fn is_all_gte(&self, other: &Coins) -> bool {
        self.checked_minus(other).is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        for coin in &self.0 {
            if !valid_denom(&coin.denom) {
                return Err(format!("invalid denom {}", coin.denom));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Coin::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for Coins {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Coins::empty());
        }
        let coins = s
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<Coin>, _>>()?;
        Ok(Coins::new(coins))
    }
}

impl<'de> Deserialize<'de> for Coins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Coins::new(Vec::<Coin>::deserialize(deserializer)?))
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Coins::new(vec![coin])
    }
}

// =============================================================================
// DECIMAL COINS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecCoin {
    pub denom: String,
    pub amount: Dec,
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for DecCoin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (amount, denom) = split_amount(s).ok_or_else(|| format!("invalid dec coin {s}"))?;
        if !valid_denom(denom) {
            return Err(format!("invalid denom in {s}"));
        }
        Ok(DecCoin {
            denom: denom.to_string(),
            amount: amount.parse()?,
        })
    }
}

impl Serialize for DecCoin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DecCoin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct DecCoins(Vec<DecCoin>);

impl DecCoins {
    pub fn new(coins: Vec<DecCoin>) -> Self {
        let mut merged: std::collections::BTreeMap<String, Dec> = Default::default();
        for coin in coins {
            *merged.entry(coin.denom).or_default() += coin.amount;
        }
        Self(
            merged
                .into_iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(|(denom, amount)| DecCoin { denom, amount })
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_coins(coins: &Coins) -> Self {
        Self::new(
            coins
                .iter()
                .map(|c| DecCoin {
                    denom: c.denom.clone(),
                    amount: Dec::from_int(c.amount),
                })
                .collect(),
        )
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecCoin> {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &str) -> Dec {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or_default()
    }

    pub fn plus(&self, other: &DecCoins) -> DecCoins {
        DecCoins::new(self.0.iter().chain(other.0.iter()).cloned().collect())
    }

    pub fn checked_minus(&self, other: &DecCoins) -> Option<DecCoins> {
        let mut out = Vec::with_capacity(self.0.len());
        for coin in &self.0 {
            let sub = other.amount_of(&coin.denom);
            out.push(DecCoin {
                denom: coin.denom.clone(),
                amount: coin.amount.checked_sub(sub)?,
            });
        }
        for coin in &other.0 {
            if !coin.amount.is_zero() && self.amount_of(&coin.denom).is_zero() {
                return None;
            }
        }
        Some(DecCoins::new(out))
    }

    pub fn mul_dec(&self, factor: Dec) -> DecCoins {
        DecCoins::new(
            self.0
                .iter()
                .map(|c| DecCoin {
                    denom: c.denom.clone(),
                    amount: c.amount.mul(factor),
                })
                .collect(),
        )
    }

    /// Each amount scaled by `num / den` with one truncation.
    pub fn mul_ratio(&self, num: Dec, den: Dec) -> DecCoins {
        DecCoins::new(
            self.0
                .iter()
                .map(|c| DecCoin {
                    denom: c.denom.clone(),
                    amount: c.amount.mul_ratio(num, den),
                })
                .collect(),
        )
    }

    /// Splits into whole coins and the fractional change.
    pub fn truncate_decimal(&self) -> (Coins, DecCoins) {
        let whole = Coins::new(
            self.0
                .iter()
                .map(|c| Coin::new(c.denom.clone(), c.amount.truncate()))
                .collect(),
        );
        let change = DecCoins::new(
            self.0
                .iter()
                .map(|c| DecCoin {
                    denom: c.denom.clone(),
                    amount: c.amount.saturating_sub(Dec::from_int(c.amount.truncate())),
                })
                .collect(),
        );
        (whole, change)
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(DecCoin::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl<'de> Deserialize<'de> for DecCoins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(DecCoins::new(Vec::<DecCoin>::deserialize(deserializer)?))
    }
}
