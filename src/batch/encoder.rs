use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::BatchError;
use crate::members::models::Member;

/// Field-id tokens the processor expects in the key record, in order.
const KEY_FIELD_IDS: [&str; 14] = [
    "101", "102", "131", "132", "133", "134", "135", "136", "137", "162", "252", "281", "282",
    "283",
];

/// Fixed trailer code closing every batch file.
const TRAILER_CODE: &str = "9999";

/// Banks whose accounts debit as savings rather than cheque.
const SAVINGS_KEYWORDS: [&str; 2] = ["savings", "mzansi"];

pub struct BatchHeader<'a> {
    pub service_key: &'a str,
    pub vendor_key: &'a str,
    pub instruction: &'a str,
    pub batch_name: &'a str,
    pub action_date: NaiveDate,
}

/// One transaction line: the account reference ties the file row back to
/// our transaction record when outcomes arrive.
pub struct BatchRow<'a> {
    pub account_ref: String,
    pub member: &'a Member,
}

/// Account type code for the transaction record: "1" for savings-keyword
/// banks, "2" otherwise.
pub fn account_type_code(bank_name: &str) -> &'static str {
    let lower = bank_name.to_lowercase();
    if SAVINGS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        "1"
    } else {
        "2"
    }
}

/// Monetary amount as integer cents, rounded to two decimals first.
pub fn amount_in_cents(amount: Decimal) -> i64 {
    (amount.round_dp(2) * dec!(100)).to_i64().unwrap_or(0)
}

/// Encodes the full tab-delimited batch file: header, key record, one
/// transaction record per row, footer. Every line ends with CRLF.
pub fn encode_batch_file(header: &BatchHeader, rows: &[BatchRow]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(rows.len() + 3);

    lines.push(format!(
        "H\t{}\t1\t{}\t{}\t{}\t{}",
        header.service_key,
        header.instruction,
        header.batch_name,
        header.action_date.format("%Y%m%d"),
        header.vendor_key,
    ));

    lines.push(format!("K\t{}", KEY_FIELD_IDS.join("\t")));

    let mut total = Decimal::ZERO;
    for row in rows {
        let m = row.member;
        total += m.monthly_premium;
        lines.push(format!(
            "T\t{}\t{}\t1\t{}\t{}\t{}\t0\t{}\t\t{}\t{}\t{}\t{}\t{}",
            row.account_ref,
            m.full_name,
            m.account_holder,
            account_type_code(&m.bank_name),
            m.branch_code,
            m.account_number,
            amount_in_cents(m.monthly_premium),
            m.email,
            m.broker_group,
            m.member_number,
            m.next_debit_date.format("%Y%m%d"),
        ));
    }

    lines.push(format!(
        "F\t{}\t{}\t{}",
        rows.len(),
        amount_in_cents(total),
        TRAILER_CODE,
    ));

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Structural validation applied before any network call: a header first,
/// a key record second, a footer last, at least one transaction line.
pub fn validate_batch_file(contents: &str) -> Result<(), BatchError> {
    let lines: Vec<&str> = contents
        .split("\r\n")
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() < 2 || !lines[0].starts_with('H') {
        return Err(BatchError::InvalidBatchFile(
            "missing header record".to_string(),
        ));
    }
    if !lines[1].starts_with('K') {
        return Err(BatchError::InvalidBatchFile(
            "missing key record".to_string(),
        ));
    }
    match lines.last() {
        Some(last) if last.starts_with('F') => {}
        _ => {
            return Err(BatchError::InvalidBatchFile(
                "missing footer record".to_string(),
            ))
        }
    }
    if !lines.iter().any(|l| l.starts_with("T\t")) {
        return Err(BatchError::InvalidBatchFile(
            "no transaction records".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::members::models::DebitOrderStatus;

    fn member(bank: &str, premium: Decimal) -> Member {
        Member {
            id: Uuid::new_v4(),
            member_number: "M001".to_string(),
            full_name: "Thandi Nkosi".to_string(),
            email: "thandi@example.com".to_string(),
            bank_name: bank.to_string(),
            account_holder: "Thandi Nkosi".to_string(),
            account_number: "62000001".to_string(),
            branch_code: "250655".to_string(),
            monthly_premium: premium,
            broker_group: "GRP-A".to_string(),
            debit_order_status: DebitOrderStatus::Active,
            next_debit_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            arrears_balance: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn header<'a>(batch_name: &'a str) -> BatchHeader<'a> {
        BatchHeader {
            service_key: "svc-key",
            vendor_key: "vendor-key",
            instruction: "TWO DAY",
            batch_name,
            action_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        }
    }

    #[test]
    fn savings_keyword_maps_to_code_1() {
        assert_eq!(account_type_code("Ithala Savings Bank"), "1");
        assert_eq!(account_type_code("First National"), "2");
    }

    #[test]
    fn amounts_encode_as_integer_cents() {
        assert_eq!(amount_in_cents(dec!(450.00)), 45000);
        assert_eq!(amount_in_cents(dec!(123.456)), 12346);
    }

    #[test]
    fn encoded_file_has_expected_shape() {
        let m = member("First National", dec!(450));
        let rows = vec![BatchRow {
            account_ref: "TX-1".to_string(),
            member: &m,
        }];
        let contents = encode_batch_file(&header("COL-20240304"), &rows);

        let lines: Vec<&str> = contents.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("H\tsvc-key\t1\tTWO DAY\tCOL-20240304\t20240304"));
        assert!(lines[1].starts_with("K\t101\t102\t"));
        assert!(lines[2].starts_with("T\tTX-1\tThandi Nkosi\t1\tThandi Nkosi\t2\t250655\t0\t62000001\t\t45000"));
        assert_eq!(lines[3], "F\t1\t45000\t9999");
        assert!(contents.ends_with("\r\n"));
    }

    #[test]
    fn footer_totals_cover_all_rows() {
        let m1 = member("First National", dec!(450));
        let m2 = member("Standard Savings", dec!(300.50));
        let rows = vec![
            BatchRow {
                account_ref: "TX-1".to_string(),
                member: &m1,
            },
            BatchRow {
                account_ref: "TX-2".to_string(),
                member: &m2,
            },
        ];
        let contents = encode_batch_file(&header("COL-20240304"), &rows);
        let lines: Vec<&str> = contents.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.last().unwrap(), &"F\t2\t75050\t9999");
    }

    #[test]
    fn structural_validation_accepts_complete_file() {
        let m = member("First National", dec!(450));
        let rows = vec![BatchRow {
            account_ref: "TX-1".to_string(),
            member: &m,
        }];
        let contents = encode_batch_file(&header("COL-20240304"), &rows);
        assert!(validate_batch_file(&contents).is_ok());
    }

    #[test]
    fn missing_footer_is_a_specific_error() {
        let m = member("First National", dec!(450));
        let rows = vec![BatchRow {
            account_ref: "TX-1".to_string(),
            member: &m,
        }];
        let contents = encode_batch_file(&header("COL-20240304"), &rows);
        let truncated: String = contents
            .split("\r\n")
            .filter(|l| !l.is_empty() && !l.starts_with('F'))
            .collect::<Vec<_>>()
            .join("\r\n");

        match validate_batch_file(&truncated) {
            Err(BatchError::InvalidBatchFile(msg)) => assert_eq!(msg, "missing footer record"),
            other => panic!("expected missing footer error, got {:?}", other),
        }
    }

    #[test]
    fn file_without_transactions_is_rejected() {
        let contents = "H\tsvc\t1\tTWO DAY\tB\t20240304\tv\r\nK\t101\r\nF\t0\t0\t9999\r\n";
        match validate_batch_file(contents) {
            Err(BatchError::InvalidBatchFile(msg)) => assert_eq!(msg, "no transaction records"),
            other => panic!("expected no transaction records error, got {:?}", other),
        }
    }
}
