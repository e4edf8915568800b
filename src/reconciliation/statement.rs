use std::collections::HashSet;

use uuid::Uuid;

use crate::reconciliation::models::{
    Direction, MatchConfidence, PaymentRecord, StatementLine, StatementMatch,
};

/// Matches bank-statement lines to completed payments by decreasing
/// confidence. Only credit lines are candidates; each payment is consumed
/// by at most one exact or probable match.
pub fn match_statement(lines: &[StatementLine], payments: &[PaymentRecord]) -> Vec<StatementMatch> {
    let mut consumed: HashSet<Uuid> = HashSet::new();
    let mut results = Vec::with_capacity(lines.len());

    for line in lines {
        results.push(match_line(line, payments, &mut consumed));
    }

    results
}

fn match_line(
    line: &StatementLine,
    payments: &[PaymentRecord],
    consumed: &mut HashSet<Uuid>,
) -> StatementMatch {
    if line.direction == Direction::Debit {
        return StatementMatch {
            line: line.clone(),
            confidence: MatchConfidence::None,
            matched_payment_id: None,
            reason: Some("not a payment".to_string()),
        };
    }

    // reference match beats everything else
    if let Some(line_ref) = line.reference.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        let by_ref = payments.iter().find(|p| {
            !consumed.contains(&p.id)
                && p.reference
                    .as_deref()
                    .map(|r| r.trim().eq_ignore_ascii_case(line_ref))
                    .unwrap_or(false)
        });
        if let Some(payment) = by_ref {
            consumed.insert(payment.id);
            let confidence = if payment.amount == line.amount {
                MatchConfidence::Exact
            } else {
                MatchConfidence::Probable
            };
            return StatementMatch {
                line: line.clone(),
                confidence,
                matched_payment_id: Some(payment.id),
                reason: if confidence == MatchConfidence::Probable {
                    Some("reference matched but amount differs".to_string())
                } else {
                    None
                },
            };
        }
    }

    // fall back to amount + date
    let candidates: Vec<&PaymentRecord> = payments
        .iter()
        .filter(|p| {
            !consumed.contains(&p.id) && p.amount == line.amount && p.date == line.value_date
        })
        .collect();

    match candidates.len() {
        1 => {
            let payment = candidates[0];
            consumed.insert(payment.id);
            StatementMatch {
                line: line.clone(),
                confidence: MatchConfidence::Probable,
                matched_payment_id: Some(payment.id),
                reason: Some("matched on amount and date".to_string()),
            }
        }
        0 => StatementMatch {
            line: line.clone(),
            confidence: MatchConfidence::None,
            matched_payment_id: None,
            reason: Some("no matching payment".to_string()),
        },
        _ => StatementMatch {
            line: line.clone(),
            confidence: MatchConfidence::Possible,
            matched_payment_id: None,
            reason: Some("multiple payments share this amount and date".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn payment(reference: Option<&str>, amount: rust_decimal::Decimal) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            reference: reference.map(String::from),
            amount,
            date: date(),
        }
    }

    fn credit(reference: Option<&str>, amount: rust_decimal::Decimal) -> StatementLine {
        StatementLine {
            reference: reference.map(String::from),
            amount,
            direction: Direction::Credit,
            value_date: date(),
            description: "EFT CREDIT".to_string(),
        }
    }

    #[test]
    fn reference_and_amount_match_is_exact() {
        let payments = vec![payment(Some("NC-100"), dec!(450))];
        let lines = vec![credit(Some("NC-100"), dec!(450))];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::Exact);
        assert_eq!(matches[0].matched_payment_id, Some(payments[0].id));
    }

    #[test]
    fn reference_match_with_amount_difference_is_probable() {
        let payments = vec![payment(Some("NC-100"), dec!(450))];
        let lines = vec![credit(Some("NC-100"), dec!(400))];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::Probable);
    }

    #[test]
    fn unique_amount_and_date_match_is_probable() {
        let payments = vec![payment(None, dec!(450))];
        let lines = vec![credit(None, dec!(450))];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::Probable);
        assert!(matches[0].matched_payment_id.is_some());
    }

    #[test]
    fn ambiguous_amount_and_date_is_possible() {
        let payments = vec![payment(None, dec!(450)), payment(None, dec!(450))];
        let lines = vec![credit(None, dec!(450))];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::Possible);
        assert!(matches[0].matched_payment_id.is_none());
    }

    #[test]
    fn debit_lines_are_never_payments() {
        let payments = vec![payment(Some("NC-100"), dec!(450))];
        let lines = vec![StatementLine {
            reference: Some("NC-100".to_string()),
            amount: dec!(450),
            direction: Direction::Debit,
            value_date: date(),
            description: "BANK CHARGES".to_string(),
        }];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::None);
        assert_eq!(matches[0].reason.as_deref(), Some("not a payment"));
    }

    #[test]
    fn each_payment_is_consumed_once() {
        let payments = vec![payment(Some("NC-100"), dec!(450))];
        let lines = vec![
            credit(Some("NC-100"), dec!(450)),
            credit(Some("NC-100"), dec!(450)),
        ];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::Exact);
        // second line finds the payment already taken
        assert_eq!(matches[1].confidence, MatchConfidence::None);
    }

    #[test]
    fn unmatched_credit_has_no_candidates() {
        let payments = vec![payment(Some("NC-100"), dec!(450))];
        let lines = vec![credit(Some("OTHER"), dec!(999))];

        let matches = match_statement(&lines, &payments);
        assert_eq!(matches[0].confidence, MatchConfidence::None);
        assert_eq!(matches[0].reason.as_deref(), Some("no matching payment"));
    }
}
