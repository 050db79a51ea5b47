//! Order-preserving encryption for sortable fields.
//!
//! Values from a numeric or temporal domain are first mapped onto `u64` by
//! an order-preserving integer encoding, then pushed through a keyed,
//! strictly increasing affine map with keyed per-value noise:
//!
//! ```text
//! c = offset(key) + x * 2^32 + noise(key, domain, x)      noise < 2^32
//! ```
//!
//! Since the noise never reaches the next multiple of `2^32`, `x < y`
//! implies `c(x) < c(y)`. The ciphertext is rendered as 32 lowercase hex
//! digits, so comparing ciphertext strings matches comparing plaintexts.
//! Decryption recovers `x` by division and rejects any ciphertext whose
//! noise does not match, which catches wrong keys and tampered values.
//!
//! The scheme is deterministic: it reveals equality and order of values
//! under the same key, which is what server-side sorting requires.

use crate::error::{CryptoError, CryptoResult};
use crate::key::TableKey;
use chrono::{Datelike, DateTime, NaiveDate, NaiveTime, SecondsFormat, Timelike, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

const SIGN_BIT: u64 = 1 << 63;
const NOISE_BITS: u32 = 32;
const NOISE_MASK: u128 = (1 << NOISE_BITS) - 1;

/// Length of an encoded ciphertext in hex digits.
pub const OPE_CIPHERTEXT_LEN: usize = 32;

const OFFSET_LABEL: &[u8] = b"activetable:ope:offset";
const NOISE_LABEL: &[u8] = b"activetable:ope:noise";

/// The plaintext domain of an order-preserving field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeDomain {
    /// Signed 64-bit integers.
    Integer,
    /// Finite IEEE-754 doubles.
    Decimal,
    /// Calendar dates, `YYYY-MM-DD`.
    Date,
    /// Instants, RFC 3339.
    DateTime,
    /// Time of day, `HH:MM:SS`.
    Time,
}

impl OpeDomain {
    fn tag(self) -> u8 {
        match self {
            Self::Integer => 1,
            Self::Decimal => 2,
            Self::Date => 3,
            Self::DateTime => 4,
            Self::Time => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
        }
    }
}

/// A plaintext value in one of the order-preserving domains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpeValue {
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Time(NaiveTime),
}

impl OpeValue {
    pub fn domain(&self) -> OpeDomain {
        match self {
            Self::Integer(_) => OpeDomain::Integer,
            Self::Decimal(_) => OpeDomain::Decimal,
            Self::Date(_) => OpeDomain::Date,
            Self::DateTime(_) => OpeDomain::DateTime,
            Self::Time(_) => OpeDomain::Time,
        }
    }

    /// Parses the textual form of a value in `domain`.
    ///
    /// Dates also accept a full RFC 3339 timestamp (the date part is kept),
    /// and times accept `HH:MM`. Datetimes must not carry precision below a
    /// millisecond.
    pub fn parse(domain: OpeDomain, raw: &str) -> CryptoResult<Self> {
        let raw = raw.trim();
        let unsupported = || CryptoError::UnsupportedValue {
            domain: domain.name(),
            value: raw.to_string(),
        };

        match domain {
            OpeDomain::Integer => raw.parse::<i64>().map(Self::Integer).map_err(|_| unsupported()),
            OpeDomain::Decimal => {
                let v = raw.parse::<f64>().map_err(|_| unsupported())?;
                Self::decimal(v)
            }
            OpeDomain::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
                .map(Self::Date)
                .map_err(|_| unsupported()),
            OpeDomain::DateTime => {
                let dt = DateTime::parse_from_rfc3339(raw).map_err(|_| unsupported())?;
                Self::datetime(dt.with_timezone(&Utc))
            }
            OpeDomain::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                .map(Self::Time)
                .map_err(|_| unsupported()),
        }
    }

    /// A decimal value; NaN and infinities have no place in an ordering.
    pub fn decimal(v: f64) -> CryptoResult<Self> {
        if v.is_finite() {
            Ok(Self::Decimal(v))
        } else {
            Err(CryptoError::UnsupportedValue {
                domain: "decimal",
                value: v.to_string(),
            })
        }
    }

    /// An instant at millisecond precision, the resolution of the encoding.
    pub fn datetime(dt: DateTime<Utc>) -> CryptoResult<Self> {
        if dt.timestamp_subsec_nanos() % 1_000_000 == 0 {
            Ok(Self::DateTime(dt))
        } else {
            Err(CryptoError::UnsupportedValue {
                domain: "datetime",
                value: dt.to_rfc3339_opts(SecondsFormat::Nanos, true),
            })
        }
    }

    /// Rejects values the encoding cannot represent exactly.
    fn check(&self) -> CryptoResult<()> {
        match *self {
            Self::Decimal(v) => Self::decimal(v).map(drop),
            Self::DateTime(dt) => Self::datetime(dt).map(drop),
            _ => Ok(()),
        }
    }

    /// Maps the value onto `u64` so that unsigned order equals value order.
    fn to_ordered_u64(self) -> u64 {
        match self {
            Self::Integer(i) => (i as u64) ^ SIGN_BIT,
            Self::Decimal(f) => {
                let bits = f.to_bits();
                if bits & SIGN_BIT != 0 { !bits } else { bits ^ SIGN_BIT }
            }
            Self::Date(d) => (i64::from(d.num_days_from_ce()) as u64) ^ SIGN_BIT,
            Self::DateTime(dt) => (dt.timestamp_millis() as u64) ^ SIGN_BIT,
            Self::Time(t) => u64::from(t.num_seconds_from_midnight()),
        }
    }

    fn from_ordered_u64(domain: OpeDomain, x: u64) -> CryptoResult<Self> {
        let out_of_range = || CryptoError::Decryption(format!("{} out of range", domain.name()));
        match domain {
            OpeDomain::Integer => Ok(Self::Integer((x ^ SIGN_BIT) as i64)),
            OpeDomain::Decimal => {
                let bits = if x & SIGN_BIT != 0 { x ^ SIGN_BIT } else { !x };
                let v = f64::from_bits(bits);
                if v.is_finite() { Ok(Self::Decimal(v)) } else { Err(out_of_range()) }
            }
            OpeDomain::Date => {
                let days = i32::try_from((x ^ SIGN_BIT) as i64).map_err(|_| out_of_range())?;
                NaiveDate::from_num_days_from_ce_opt(days)
                    .map(Self::Date)
                    .ok_or_else(out_of_range)
            }
            OpeDomain::DateTime => DateTime::from_timestamp_millis((x ^ SIGN_BIT) as i64)
                .map(Self::DateTime)
                .ok_or_else(out_of_range),
            OpeDomain::Time => {
                let secs = u32::try_from(x).map_err(|_| out_of_range())?;
                NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
                    .map(Self::Time)
                    .ok_or_else(out_of_range)
            }
        }
    }
}

impl fmt::Display for OpeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
        }
    }
}

/// Per-key parameters of the transform.
#[derive(Zeroize, ZeroizeOnDrop)]
struct OpeKey {
    offset: u64,
    noise_key: [u8; 32],
}

impl OpeKey {
    fn derive(key: &TableKey) -> Self {
        let offset_bytes = prf(key.as_bytes(), &[OFFSET_LABEL]);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&offset_bytes[..8]);

        Self {
            offset: u64::from_be_bytes(offset),
            noise_key: prf(key.as_bytes(), &[NOISE_LABEL]),
        }
    }

    fn noise(&self, domain: OpeDomain, x: u64) -> u128 {
        let out = prf(&self.noise_key, &[&[domain.tag()], &x.to_be_bytes()]);
        let mut n = [0u8; 4];
        n.copy_from_slice(&out[..4]);
        u128::from(u32::from_be_bytes(n))
    }
}

fn prf(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Encrypts a value into a fixed-width hex ciphertext.
pub fn encrypt_order_preserving(value: &OpeValue, key: &TableKey) -> CryptoResult<String> {
    value.check()?;
    let params = OpeKey::derive(key);
    let x = value.to_ordered_u64();
    let c = u128::from(params.offset)
        + (u128::from(x) << NOISE_BITS)
        + params.noise(value.domain(), x);
    Ok(format!("{c:0width$x}", width = OPE_CIPHERTEXT_LEN))
}

/// Decrypts a ciphertext produced by [`encrypt_order_preserving`] for the
/// same domain and key.
pub fn decrypt_order_preserving(
    encoded: &str,
    domain: OpeDomain,
    key: &TableKey,
) -> CryptoResult<OpeValue> {
    let encoded = encoded.trim();
    if encoded.len() != OPE_CIPHERTEXT_LEN {
        return Err(CryptoError::Encoding(format!(
            "expected {OPE_CIPHERTEXT_LEN} hex digits, got {}",
            encoded.len()
        )));
    }
    let c = u128::from_str_radix(encoded, 16)
        .map_err(|e| CryptoError::Encoding(format!("invalid hex: {e}")))?;

    let params = OpeKey::derive(key);
    let shifted = c
        .checked_sub(u128::from(params.offset))
        .ok_or_else(|| CryptoError::Decryption("ciphertext below key offset".into()))?;

    let x = u64::try_from(shifted >> NOISE_BITS)
        .map_err(|_| CryptoError::Decryption("ciphertext out of range".into()))?;
    if shifted & NOISE_MASK != params.noise(domain, x) {
        return Err(CryptoError::Decryption(
            "noise mismatch (wrong key or domain?)".into(),
        ));
    }

    OpeValue::from_ordered_u64(domain, x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TableKey {
        TableKey::new("abcdef1234567890ABCDEF1234567890").unwrap()
    }

    #[test]
    fn integer_round_trip_and_order() {
        let k = key();
        let values = [i64::MIN, -1_000, -1, 0, 1, 42, i64::MAX];
        let cts: Vec<String> = values
            .iter()
            .map(|v| encrypt_order_preserving(&OpeValue::Integer(*v), &k).unwrap())
            .collect();

        for pair in cts.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        for (v, ct) in values.iter().zip(&cts) {
            assert_eq!(
                decrypt_order_preserving(ct, OpeDomain::Integer, &k).unwrap(),
                OpeValue::Integer(*v)
            );
        }
    }

    #[test]
    fn decimals_order_across_sign() {
        let k = key();
        let a = encrypt_order_preserving(&OpeValue::Decimal(-2.5), &k).unwrap();
        let b = encrypt_order_preserving(&OpeValue::Decimal(-0.25), &k).unwrap();
        let c = encrypt_order_preserving(&OpeValue::Decimal(0.5), &k).unwrap();
        let d = encrypt_order_preserving(&OpeValue::Decimal(1e12), &k).unwrap();
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn deterministic_under_same_key() {
        let k = key();
        let v = OpeValue::Integer(7);
        assert_eq!(
            encrypt_order_preserving(&v, &k).unwrap(),
            encrypt_order_preserving(&v, &k).unwrap()
        );
    }

    #[test]
    fn wrong_key_is_detected() {
        let ct = encrypt_order_preserving(&OpeValue::Integer(7), &key()).unwrap();
        let other = TableKey::new("wrongkey1234567890WRONGKEY123456").unwrap();
        assert!(decrypt_order_preserving(&ct, OpeDomain::Integer, &other).is_err());
    }

    #[test]
    fn temporal_values_round_trip() {
        let k = key();
        for (domain, raw, expected) in [
            (OpeDomain::Date, "2024-02-29", "2024-02-29"),
            (OpeDomain::DateTime, "2024-01-01T10:00:00Z", "2024-01-01T10:00:00.000Z"),
            (OpeDomain::DateTime, "2024-01-01T12:00:00+02:00", "2024-01-01T10:00:00.000Z"),
            (OpeDomain::Time, "23:59:58", "23:59:58"),
            (OpeDomain::Time, "08:30", "08:30:00"),
        ] {
            let value = OpeValue::parse(domain, raw).unwrap();
            let ct = encrypt_order_preserving(&value, &k).unwrap();
            let back = decrypt_order_preserving(&ct, domain, &k).unwrap();
            assert_eq!(back.to_string(), expected);
        }
    }

    #[test]
    fn non_finite_decimal_is_rejected() {
        assert!(OpeValue::decimal(f64::NAN).is_err());
        assert!(encrypt_order_preserving(&OpeValue::Decimal(f64::INFINITY), &key()).is_err());
    }

    #[test]
    fn sub_millisecond_datetimes_are_rejected() {
        assert!(OpeValue::parse(OpeDomain::DateTime, "2024-01-01T10:00:00.123Z").is_ok());
        assert!(OpeValue::parse(OpeDomain::DateTime, "2024-01-01T10:00:00.1234Z").is_err());

        let precise = DateTime::from_timestamp(1_700_000_000, 1_500).unwrap();
        assert!(encrypt_order_preserving(&OpeValue::DateTime(precise), &key()).is_err());
    }

    #[test]
    fn malformed_ciphertext_is_rejected() {
        let k = key();
        assert!(decrypt_order_preserving("xyz", OpeDomain::Integer, &k).is_err());
        assert!(decrypt_order_preserving(&"g".repeat(32), OpeDomain::Integer, &k).is_err());
    }
}
