use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::ReportCode;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn report_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{4}-[0-9]{4}$").expect("report code pattern is valid"))
}

pub fn is_valid_report_code(code: &str) -> bool {
    report_code_pattern().is_match(code)
}

/// Four random uppercase letters, a hyphen, four random digits.
pub fn generate_report_code<R: Rng + ?Sized>(rng: &mut R) -> ReportCode {
    let mut code = String::with_capacity(9);
    for _ in 0..4 {
        code.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    }
    code.push('-');
    for _ in 0..4 {
        code.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    ReportCode::from_generated(code)
}
