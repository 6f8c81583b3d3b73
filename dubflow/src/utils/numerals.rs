//! Sino-numeral spelling for spoken episode numbers.

use crate::core::Language;

const KOREAN_DIGITS: [&str; 9] = ["일", "이", "삼", "사", "오", "육", "칠", "팔", "구"];
const CJK_DIGITS: [&str; 9] = ["一", "二", "三", "四", "五", "六", "七", "八", "九"];

/// Spells a number in positional sino numerals (`이백삼십사`, `二百三十四`)
/// for the spoken episode headings. Zero and numbers above 999 stay decimal.
#[must_use]
pub fn sino_numeral(number: u32, language: Language) -> String {
    if number == 0 || number > 999 {
        return number.to_string();
    }
    let (digits, ten, hundred) = match language {
        Language::Korean => (&KOREAN_DIGITS, "십", "백"),
        Language::Japanese | Language::Taiwanese => (&CJK_DIGITS, "十", "百"),
    };
    let mut out = String::new();
    let h = (number / 100) as usize;
    let t = ((number % 100) / 10) as usize;
    let o = (number % 10) as usize;
    if h > 0 {
        if h > 1 {
            out.push_str(digits[h - 1]);
        }
        out.push_str(hundred);
    }
    if t > 0 {
        if t > 1 {
            out.push_str(digits[t - 1]);
        }
        out.push_str(ten);
    }
    if o > 0 {
        out.push_str(digits[o - 1]);
    }
    out
}
