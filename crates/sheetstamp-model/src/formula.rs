use crate::address::reference_pattern;
use crate::{Address, Error};

/// Characters that end a formula token. Anything between two delimiters that
/// looks like a cell reference gets translated; every other token passes
/// through untouched. This is a purely lexical rewrite, not a parse.
const DELIMITERS: &[char] = &[
    '(', ')', '+', '-', '*', '&', '/', ' ', '=', ',', '!', ':',
];

/// Rewrite every relative cell reference in `formula` by the given deltas.
/// `$`-anchored axes stay put. Fails if any reference would leave the sheet.
pub fn translate_formula(formula: &str, col_delta: i64, row_delta: i64) -> Result<String, Error> {
    let mut out = String::with_capacity(formula.len() + 8);
    let mut token = String::new();
    for ch in formula.chars() {
        if DELIMITERS.contains(&ch) {
            flush_token(&mut out, &token, col_delta, row_delta)?;
            token.clear();
            out.push(ch);
        } else {
            token.push(ch);
        }
    }
    flush_token(&mut out, &token, col_delta, row_delta)?;
    Ok(out)
}

fn flush_token(out: &mut String, token: &str, col_delta: i64, row_delta: i64) -> Result<(), Error> {
    if token.is_empty() {
        return Ok(());
    }
    if reference_pattern().is_match(token) {
        let moved = Address::parse(token)?.translate(col_delta, row_delta)?;
        out.push_str(&moved.to_string());
    } else {
        out.push_str(token);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn translates_references_in_sums() {
        assert_eq!(
            translate_formula("SUM(A1:B2)", 1, 2).unwrap(),
            "SUM(B3:C4)"
        );
        assert_eq!(
            translate_formula("A1+B1*2", 0, 3).unwrap(),
            "A4+B4*2"
        );
    }

    #[test]
    fn anchored_axes_stay_put() {
        assert_eq!(
            translate_formula("SUM($A$1:B2)", 2, 2).unwrap(),
            "SUM($A$1:D4)"
        );
        assert_eq!(translate_formula("$A1&B$2", 1, 1).unwrap(), "$A2&C$2");
    }

    #[test]
    fn non_reference_tokens_pass_through() {
        assert_eq!(
            translate_formula("IF(LEN1>0, \"A1x\", total)", 1, 1).unwrap(),
            "IF(LEN1>0, \"A1x\", total)"
        );
    }

    #[test]
    fn rewrite_is_lexical_not_parsed() {
        // A token like LOG10 is reference-shaped at the lexical level and
        // moves with the delta, same as a real cell reference.
        assert_eq!(translate_formula("LOG10(C3)", 0, 1).unwrap(), "LOG11(C4)");
    }

    #[test]
    fn sheet_qualified_references_translate() {
        assert_eq!(
            translate_formula("Rates!B2*C3", 0, 1).unwrap(),
            "Rates!B3*C4"
        );
    }

    #[test]
    fn off_sheet_translation_fails() {
        assert!(translate_formula("SUM(A1:B2)", -1, 0).is_err());
        assert!(translate_formula("B2-A1", 0, -1).is_err());
    }

    #[test]
    fn empty_and_delimiter_only_input() {
        assert_eq!(translate_formula("", 5, 5).unwrap(), "");
        assert_eq!(translate_formula("((, ))", 5, 5).unwrap(), "((, ))");
    }
}
