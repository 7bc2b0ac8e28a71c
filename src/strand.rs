use clap::ValueEnum;

/// Whether coverage and UTR calling distinguish the two DNA strands.
#[derive(Debug, ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
pub enum StrandMode {
    /// Pool reads from both strands.
    #[default]
    Unstranded,
    /// Process forward and reverse strands separately.
    Stranded,
}

/// One strand of a stranded coverage pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrand {
    Forward,
    Reverse,
}

impl ReadStrand {
    pub const BOTH: [ReadStrand; 2] = [ReadStrand::Forward, ReadStrand::Reverse];

    /// BED strand symbol appended to stranded bedgraph rows.
    pub fn symbol(self) -> char {
        match self {
            ReadStrand::Forward => '+',
            ReadStrand::Reverse => '-',
        }
    }

    /// Value handed to `bamCoverage --filterRNAstrand`.
    pub fn filter_arg(self) -> &'static str {
        match self {
            ReadStrand::Forward => "forward",
            ReadStrand::Reverse => "reverse",
        }
    }

    /// File stem for this strand's intermediates (`for.bedgraph` etc).
    pub fn stem(self) -> &'static str {
        match self {
            ReadStrand::Forward => "for",
            ReadStrand::Reverse => "rev",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols() {
        assert_eq!(ReadStrand::Forward.symbol(), '+');
        assert_eq!(ReadStrand::Reverse.symbol(), '-');
    }

    #[test]
    fn test_filter_args() {
        assert_eq!(ReadStrand::Forward.filter_arg(), "forward");
        assert_eq!(ReadStrand::Reverse.filter_arg(), "reverse");
    }

    #[test]
    fn test_default_mode_is_unstranded() {
        assert_eq!(StrandMode::default(), StrandMode::Unstranded);
    }
}
