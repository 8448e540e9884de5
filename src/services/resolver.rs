//! Country/Currency Resolver.
//!
//! Determines where and in what currency a creator gets paid, walking an
//! ordered fallback chain: profile country, verified bank account currency,
//! bank routing code, and finally a USD/US default on the generic rails.
//! Resolution never fails; the default guarantees termination.
//!
//! The lookup tables are immutable statics loaded with the binary; there is
//! deliberately no module-level mutable state here.

use serde::Serialize;
use uuid::Uuid;

use crate::crypto::FieldCipher;
use crate::stores::CreatorStore;

/// Which rails a payout is routed over.
///
/// `Wise` covers the provider's directly supported corridors; everything
/// else goes through the generic cross-border route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutMethod {
    Wise,
    Generic,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub country_code: String,
    pub currency: String,
    pub payout_method: PayoutMethod,
}

/// Country -> payout currency.
static COUNTRY_CURRENCY: &[(&str, &str)] = &[
    ("US", "USD"),
    ("GB", "GBP"),
    ("CA", "CAD"),
    ("AU", "AUD"),
    ("DE", "EUR"),
    ("FR", "EUR"),
    ("ES", "EUR"),
    ("IT", "EUR"),
    ("NL", "EUR"),
    ("IE", "EUR"),
    ("NG", "NGN"),
    ("GH", "GHS"),
    ("KE", "KES"),
    ("ZA", "ZAR"),
    ("IN", "INR"),
    ("BR", "BRL"),
    ("MX", "MXN"),
    ("JP", "JPY"),
];

/// Currency -> inferred country, for creators whose profile never captured
/// a country. Euro intentionally maps to Germany; the corridor is the same
/// across the eurozone.
static CURRENCY_COUNTRY: &[(&str, &str)] = &[
    ("USD", "US"),
    ("GBP", "GB"),
    ("CAD", "CA"),
    ("AUD", "AU"),
    ("EUR", "DE"),
    ("NGN", "NG"),
    ("GHS", "GH"),
    ("KES", "KE"),
    ("ZAR", "ZA"),
    ("INR", "IN"),
    ("BRL", "BR"),
    ("MXN", "MX"),
    ("JPY", "JP"),
];

/// National bank-code prefixes -> country, matched against the decrypted
/// routing identifier. Covers the corridors where creators commonly have a
/// bank account but neither profile country nor account currency on file.
static BANK_CODE_COUNTRY: &[(&str, &str)] = &[
    // NUBAN bank codes
    ("044", "NG"),
    ("057", "NG"),
    ("058", "NG"),
    ("011", "NG"),
    // Ghanaian bank sort codes
    ("GH", "GH"),
    // UK sort codes are 6 digits starting 0-9; too ambiguous to claim here.
    // IFSC codes are alphanumeric starting with the bank's letters.
    ("SBIN", "IN"),
    ("HDFC", "IN"),
    ("ICIC", "IN"),
];

/// Corridors the primary provider supports directly.
static WISE_SUPPORTED: &[&str] = &[
    "US", "GB", "CA", "AU", "DE", "FR", "ES", "IT", "NL", "IE", "IN", "BR", "MX", "JP",
];

const DEFAULT_COUNTRY: &str = "US";
const DEFAULT_CURRENCY: &str = "USD";

fn currency_for_country(country: &str) -> Option<&'static str> {
    COUNTRY_CURRENCY
        .iter()
        .find(|(c, _)| *c == country)
        .map(|(_, currency)| *currency)
}

fn country_for_currency(currency: &str) -> Option<&'static str> {
    CURRENCY_COUNTRY
        .iter()
        .find(|(c, _)| *c == currency)
        .map(|(_, country)| *country)
}

fn country_for_bank_code(routing: &str) -> Option<&'static str> {
    BANK_CODE_COUNTRY
        .iter()
        .find(|(prefix, _)| routing.starts_with(prefix))
        .map(|(_, country)| *country)
}

fn method_for_country(country: &str) -> PayoutMethod {
    if WISE_SUPPORTED.contains(&country) {
        PayoutMethod::Wise
    } else {
        PayoutMethod::Generic
    }
}

fn resolution(country: &str, currency: &str) -> Resolution {
    Resolution {
        country_code: country.to_string(),
        currency: currency.to_string(),
        payout_method: method_for_country(country),
    }
}

/// Resolve a creator's payout country, currency, and routing method.
///
/// Best-effort: store or decryption failures log a warning and fall through
/// to the next source rather than failing the payout request.
pub async fn resolve(
    creators: &dyn CreatorStore,
    cipher: &FieldCipher,
    creator_id: Uuid,
) -> Resolution {
    // 1. Profile country.
    match creators.get_profile(creator_id).await {
        Ok(Some(profile)) => {
            if let Some(country) = profile.country_code.as_deref() {
                if let Some(currency) = currency_for_country(country) {
                    return resolution(country, currency);
                }
                tracing::warn!(%creator_id, country, "profile country has no currency mapping");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(%creator_id, error = %e, "profile lookup failed during resolution"),
    }

    // 2/3. Verified bank account: currency first, then routing code.
    match creators.get_verified_bank_account(creator_id).await {
        Ok(Some(account)) => {
            if let Some(country) = country_for_currency(&account.currency) {
                return resolution(country, &account.currency);
            }

            match cipher.decrypt(&account.routing_number_encrypted) {
                Ok(routing) => {
                    if let Some(country) = country_for_bank_code(&routing) {
                        let currency =
                            currency_for_country(country).unwrap_or(DEFAULT_CURRENCY);
                        return resolution(country, currency);
                    }
                }
                Err(e) => {
                    tracing::warn!(%creator_id, error = %e, "routing identifier decryption failed")
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(%creator_id, error = %e, "bank account lookup failed during resolution")
        }
    }

    // 4. Baseline.
    resolution(DEFAULT_COUNTRY, DEFAULT_CURRENCY)
}
