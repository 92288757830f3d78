//! Zap invoice amount parsing (spec §4.7 "Invoice amount parsing").
//!
//! Heuristic and deliberately narrow: only the human-readable amount
//! prefix is decoded, there is no payment oracle integration. Invalid
//! strings return `None`; callers count the zap with zero sats but still
//! raise `last-interaction-at` (spec §7: Parse errors are non-fatal).

const NETWORK_PREFIXES: [&str; 5] = ["bcrt", "tbs", "tb", "bc", "sb"];

/// Parses the satoshi amount from a bolt11 invoice string, applying the
/// `m`/`u`/`n`/`p` multiplier to a base of 10⁸ sat. Returns `None` if the
/// invoice has no recognizable amount or malformed separator.
pub fn parse_bolt11_amount_sats(invoice: &str) -> Option<u64> {
    let lower = invoice.to_ascii_lowercase();
    let rest = lower.strip_prefix("ln")?;

    // The bech32 data part excludes '1' from its charset entirely, so the
    // separator is unambiguous: the LAST '1' in the string, however many
    // appear earlier as amount digits.
    let sep_idx = rest.rfind('1')?;
    let hrp_rest = &rest[..sep_idx];
    let hrp_rest = NETWORK_PREFIXES
        .iter()
        .find_map(|prefix| hrp_rest.strip_prefix(prefix))
        .unwrap_or(hrp_rest);

    if hrp_rest.is_empty() {
        return None;
    }
    let digit_end = hrp_rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(hrp_rest.len());
    if digit_end == 0 {
        return None;
    }
    let amount: u64 = hrp_rest[..digit_end].parse().ok()?;
    let multiplier = match &hrp_rest[digit_end..] {
        "" => None,
        "m" => Some('m'),
        "u" => Some('u'),
        "n" => Some('n'),
        "p" => Some('p'),
        _ => return None,
    };

    let sats = match multiplier {
        None => amount.checked_mul(100_000_000)?,
        Some('m') => amount.checked_mul(100_000)?,
        Some('u') => amount.checked_mul(100)?,
        Some('n') => amount / 10,
        Some('p') => amount / 10_000,
        _ => unreachable!(),
    };
    Some(sats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_micro_bitcoin_amount() {
        assert_eq!(parse_bolt11_amount_sats("lnbc100u1pj8qdz0sp5..."), Some(10_000));
    }

    #[test]
    fn parses_milli_bitcoin_amount() {
        assert_eq!(parse_bolt11_amount_sats("lnbc1m1pj8qdz0sp5..."), Some(100_000));
    }

    #[test]
    fn parses_nano_and_pico_with_integer_division() {
        assert_eq!(parse_bolt11_amount_sats("lnbc25n1pj8qdz0sp5..."), Some(2));
        assert_eq!(parse_bolt11_amount_sats("lnbc25000p1pj8qdz0sp5..."), Some(2));
    }

    #[test]
    fn whole_units_use_full_base() {
        assert_eq!(parse_bolt11_amount_sats("lnbc211pj8qdz0sp5..."), Some(2_100_000_000));
    }

    #[test]
    fn rejects_invoice_without_amount() {
        assert_eq!(parse_bolt11_amount_sats("lnbc1pj8qdz0sp5..."), None);
    }

    #[test]
    fn rejects_non_invoice_strings() {
        assert_eq!(parse_bolt11_amount_sats("not an invoice"), None);
    }
}
