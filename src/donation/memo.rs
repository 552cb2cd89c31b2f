//! Donation memos tying a ledger payment to one gate round.

use rand::Rng;

const MEMO_PREFIX: &str = "kairos";

/// `kairos` followed by six random digits.
pub fn generate_memo() -> String {
    let digits: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    format!("{MEMO_PREFIX}{digits}")
}
