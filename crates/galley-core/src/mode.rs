use std::fmt;

/// Unix permission bits, written in octal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    /// Parse `755` or `0755`.
    pub fn parse(mode: &str) -> crate::Result<Self> {
        let invalid = |reason| crate::Error::InvalidMode {
            mode: mode.to_owned(),
            reason,
        };

        if !(3..=4).contains(&mode.len()) {
            return Err(invalid("expected 3 or 4 octal digits"));
        }
        if !mode.chars().all(|c| ('0'..='7').contains(&c)) {
            return Err(invalid("not an octal number"));
        }
        let bits = mode
            .chars()
            .filter_map(|c| c.to_digit(8))
            .fold(0u32, |acc, d| acc * 8 + d);
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn owner_has_full_access(self) -> bool {
        self.0 & 0o700 == 0o700
    }

    /// Group or other write bit set.
    pub const fn others_can_write(self) -> bool {
        self.0 & 0o022 != 0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}
