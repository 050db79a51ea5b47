use activetable_crypto::{
    decrypt_order_preserving, encrypt_order_preserving, OpeDomain, OpeValue, TableKey,
    OPE_CIPHERTEXT_LEN,
};
use proptest::prelude::*;

fn key() -> TableKey {
    TableKey::new("abcdef1234567890ABCDEF1234567890").unwrap()
}

fn enc(v: OpeValue) -> String {
    encrypt_order_preserving(&v, &key()).unwrap()
}

#[test]
fn ciphertexts_are_fixed_width_hex() {
    for v in [
        OpeValue::Integer(i64::MIN),
        OpeValue::Integer(0),
        OpeValue::Integer(i64::MAX),
        OpeValue::Decimal(-1.5),
    ] {
        let ct = enc(v);
        assert_eq!(ct.len(), OPE_CIPHERTEXT_LEN);
        assert!(ct.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn dates_sort_chronologically() {
    let dates = ["1969-12-31", "1970-01-01", "2000-02-29", "2024-12-31"];
    let cts: Vec<String> = dates
        .iter()
        .map(|d| enc(OpeValue::parse(OpeDomain::Date, d).unwrap()))
        .collect();
    let mut sorted = cts.clone();
    sorted.sort();
    assert_eq!(cts, sorted);
}

#[test]
fn domain_mismatch_fails_to_decrypt() {
    let ct = enc(OpeValue::Integer(12));
    assert!(decrypt_order_preserving(&ct, OpeDomain::Date, &key()).is_err());
}

#[test]
fn unparseable_values_are_rejected() {
    assert!(OpeValue::parse(OpeDomain::Integer, "12.5").is_err());
    assert!(OpeValue::parse(OpeDomain::Date, "31/12/2024").is_err());
    assert!(OpeValue::parse(OpeDomain::Decimal, "NaN").is_err());
}

proptest! {
    #[test]
    fn prop_integer_order(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a < b);
        prop_assert!(enc(OpeValue::Integer(a)) < enc(OpeValue::Integer(b)));
    }

    #[test]
    fn prop_decimal_order(a in -1e15f64..1e15, b in -1e15f64..1e15) {
        prop_assume!(a < b);
        prop_assert!(enc(OpeValue::Decimal(a)) < enc(OpeValue::Decimal(b)));
    }

    #[test]
    fn prop_integer_round_trip(v in any::<i64>()) {
        let back = decrypt_order_preserving(&enc(OpeValue::Integer(v)), OpeDomain::Integer, &key()).unwrap();
        prop_assert_eq!(back, OpeValue::Integer(v));
    }

    #[test]
    fn prop_datetime_order(a in 0i64..4_102_444_800_000, b in 0i64..4_102_444_800_000) {
        prop_assume!(a < b);
        let ta = chrono::DateTime::from_timestamp_millis(a).unwrap();
        let tb = chrono::DateTime::from_timestamp_millis(b).unwrap();
        prop_assert!(enc(OpeValue::DateTime(ta)) < enc(OpeValue::DateTime(tb)));
    }
}
