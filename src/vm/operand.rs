//! Operand tokens for one assembly line

use super::labels::LabelTable;
use super::register::Reg;
use super::scent::parse_channel;
use std::str::SplitWhitespace;

/// Cursor over the operand tokens following a mnemonic.
///
/// Error messages name the instruction and its usage so arity mistakes
/// are reported per command.
pub struct Operands<'a> {
    tokens: SplitWhitespace<'a>,
    mnemonic: &'static str,
    usage: &'static str,
}

impl<'a> Operands<'a> {
    pub fn new(rest: &'a str, mnemonic: &'static str, usage: &'static str) -> Self {
        Self {
            tokens: rest.split_whitespace(),
            mnemonic,
            usage,
        }
    }

    fn usage_hint(&self) -> String {
        if self.usage.is_empty() {
            format!("{} takes no operands", self.mnemonic)
        } else {
            format!("usage: {} {}", self.mnemonic, self.usage)
        }
    }

    fn next(&mut self, what: &str) -> Result<&'a str, String> {
        self.tokens
            .next()
            .ok_or_else(|| format!("{} is missing its {} ({})", self.mnemonic, what, self.usage_hint()))
    }

    pub fn register(&mut self) -> Result<Reg, String> {
        let token = self.next("register")?;
        Reg::parse(token).ok_or_else(|| format!("'{}' is not a register, expected A or B", token))
    }

    /// 32-bit constant: decimal (optionally negative) or `0x` hex
    pub fn constant(&mut self) -> Result<u32, String> {
        let token = self.next("constant")?;
        parse_constant(token).ok_or_else(|| format!("'{}' is not a valid 32-bit constant", token))
    }

    /// Jump target: label name or literal step index
    pub fn target(&mut self, labels: &LabelTable) -> Result<u16, String> {
        let token = self.next("jump target")?;
        if let Ok(index) = token.parse::<u16>() {
            return Ok(index);
        }
        labels
            .step_of(token)
            .ok_or_else(|| format!("unknown label '{}'", token))
    }

    pub fn channel(&mut self) -> Result<u8, String> {
        let token = self.next("scent channel")?;
        parse_channel(token).ok_or_else(|| format!("'{}' is not a scent channel, expected A-H", token))
    }

    pub fn priority(&mut self) -> Result<i8, String> {
        let token = self.next("priority")?;
        token
            .parse::<i8>()
            .map_err(|_| format!("'{}' is not a valid priority (-128 to 127)", token))
    }

    /// Fail if operands are left over
    pub fn finish(mut self) -> Result<(), String> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(format!("unexpected operand '{}' ({})", extra, self.usage_hint())),
        }
    }
}

fn parse_constant(token: &str) -> Option<u32> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    let value = token.parse::<i64>().ok()?;
    if value < i32::MIN as i64 || value > u32::MAX as i64 {
        return None;
    }
    Some(value as u32)
}

/// Remove a trailing `#` comment
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(parse_constant("5"), Some(5));
        assert_eq!(parse_constant("-1"), Some(u32::MAX));
        assert_eq!(parse_constant("0xff"), Some(255));
        assert_eq!(parse_constant("4294967295"), Some(u32::MAX));
        assert_eq!(parse_constant("4294967296"), None);
        assert_eq!(parse_constant("-2147483649"), None);
        assert_eq!(parse_constant("five"), None);
    }

    #[test]
    fn test_operand_errors_name_command() {
        let mut ops = Operands::new("", "LOAD", "<register> <constant>");
        let err = ops.register().unwrap_err();
        assert!(err.contains("LOAD"));
        assert!(err.contains("usage"));

        let mut ops = Operands::new("A", "INC", "<register>");
        assert_eq!(ops.register(), Ok(Reg::A));
        assert!(ops.finish().is_ok());

        let mut ops = Operands::new("A B", "INC", "<register>");
        ops.register().unwrap();
        let err = ops.finish().unwrap_err();
        assert!(err.contains("'B'"));
        assert!(err.contains("INC"));
    }

    #[test]
    fn test_targets() {
        let mut labels = LabelTable::new();
        labels.insert("loop", 3);
        assert_eq!(Operands::new("loop", "JMP", "<label>").target(&labels), Ok(3));
        assert_eq!(Operands::new("12", "JMP", "<label>").target(&labels), Ok(12));
        assert!(Operands::new("nowhere", "JMP", "<label>").target(&labels).is_err());
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("INC A # bump"), "INC A ");
        assert_eq!(strip_comment("# only"), "");
        assert_eq!(strip_comment("NOP"), "NOP");
    }
}
