use std::fmt;

use serde::{Deserialize, Serialize};

/// The stream stores the operand first and the runtime value second, so
/// `test(operand, value)` reads as `value <op> operand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    pub const ALL: [Comparator; 6] = [
        Comparator::Eq,
        Comparator::Gt,
        Comparator::Lt,
        Comparator::Ge,
        Comparator::Le,
        Comparator::Ne,
    ];

    pub fn from_opcode(op: u8) -> Option<Self> {
        Self::ALL.get(op as usize).copied()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
            Comparator::Ne => "!=",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.symbol() == s)
    }

    pub fn test(self, operand: i64, value: i64) -> bool {
        match self {
            Comparator::Eq => value == operand,
            Comparator::Gt => value > operand,
            Comparator::Lt => value < operand,
            Comparator::Ge => value >= operand,
            Comparator::Le => value <= operand,
            Comparator::Ne => value != operand,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_or_equal_compares_value_against_operand() {
        assert!(Comparator::Ge.test(5, 5));
        assert!(!Comparator::Ge.test(5, 4));
        assert!(Comparator::Ge.test(5, 6));
    }

    #[test]
    fn strict_comparators_keep_argument_order() {
        assert!(Comparator::Gt.test(1, 2));
        assert!(!Comparator::Gt.test(2, 1));
        assert!(Comparator::Lt.test(2, 1));
        assert!(Comparator::Le.test(3, 3));
        assert!(Comparator::Eq.test(7, 7));
        assert!(Comparator::Ne.test(7, 8));
        assert!(!Comparator::Ne.test(8, 8));
    }

    #[test]
    fn opcode_bytes_follow_table_order() {
        assert_eq!(Comparator::from_opcode(0), Some(Comparator::Eq));
        assert_eq!(Comparator::from_opcode(3), Some(Comparator::Ge));
        assert_eq!(Comparator::from_opcode(5), Some(Comparator::Ne));
        assert_eq!(Comparator::from_opcode(6), None);
    }

    #[test]
    fn symbols_round_trip() {
        for c in Comparator::ALL {
            assert_eq!(Comparator::from_symbol(c.symbol()), Some(c));
        }
        assert_eq!(serde_json::to_string(&Comparator::Le).unwrap(), "\"<=\"");
    }
}
