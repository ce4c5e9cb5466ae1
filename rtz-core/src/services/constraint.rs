use crate::error::{EncodingError, OverflowError};
use crate::model::block::{Padding, TextBlock};
use crate::model::report::PatchOutcome;
use crate::model::token::{trim_terminators, Token};
use crate::services::codec::Codec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeConstraint {
    pub allocated_length: usize,
    pub padding: Padding,
    pub allow_truncation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fit {
    /// Exactly `allocated_length` bytes.
    Padded(Vec<u8>),
    Overflow(OverflowError),
}

/// Result of applying the overflow policy to a token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constrained {
    pub outcome: PatchOutcome,
    /// Length of the full, untruncated encoding.
    pub encoded_length: usize,
    /// Padded replacement bytes; `None` when rejected.
    pub bytes: Option<Vec<u8>>,
    /// Tokens that were actually written.
    pub kept: Vec<Token>,
    pub dropped: Vec<Token>,
    pub overflow: Option<OverflowError>,
}

impl SizeConstraint {
    pub fn for_block(block: &TextBlock, padding: &Padding, allow_truncation: bool) -> Self {
        SizeConstraint {
            allocated_length: block.allocated_length,
            padding: padding.clone(),
            allow_truncation,
        }
    }

    pub fn fit(&self, encoded: &[u8]) -> Fit {
        if encoded.len() > self.allocated_length {
            return Fit::Overflow(OverflowError {
                encoded: encoded.len(),
                allocated: self.allocated_length,
            });
        }
        let mut out = Vec::with_capacity(self.allocated_length);
        out.extend_from_slice(encoded);
        self.padding.fill(&mut out, self.allocated_length);
        Fit::Padded(out)
    }

    pub fn fit_tokens(&self, codec: &Codec, tokens: &[Token]) -> Result<Constrained, EncodingError> {
        let encoded = codec.encode(tokens)?;
        let encoded_length = encoded.len();

        let overflow = match self.fit(&encoded) {
            Fit::Padded(bytes) => {
                return Ok(Constrained {
                    outcome: PatchOutcome::Fits,
                    encoded_length,
                    bytes: Some(bytes),
                    kept: tokens.to_vec(),
                    dropped: Vec::new(),
                    overflow: None,
                })
            }
            Fit::Overflow(e) => e,
        };

        let rejected = Constrained {
            outcome: PatchOutcome::Rejected,
            encoded_length,
            bytes: None,
            kept: Vec::new(),
            dropped: Vec::new(),
            overflow: Some(overflow),
        };

        if !self.allow_truncation {
            return Ok(rejected);
        }

        let body = trim_terminators(tokens);
        let tail = &tokens[body.len()..];
        let prefix = |k: usize| -> Result<Vec<u8>, EncodingError> {
            let mut t = body[..k].to_vec();
            t.extend_from_slice(tail);
            codec.encode(&t)
        };

        // Encoded length grows with k; find the largest k that fits.
        let (mut lo, mut hi) = (0usize, body.len());
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if prefix(mid)?.len() <= self.allocated_length {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        if lo == 0 {
            return Ok(rejected);
        }

        let mut kept = body[..lo].to_vec();
        kept.extend_from_slice(tail);
        match self.fit(&prefix(lo)?) {
            Fit::Padded(bytes) => Ok(Constrained {
                outcome: PatchOutcome::Truncated,
                encoded_length,
                bytes: Some(bytes),
                kept,
                dropped: body[lo..].to_vec(),
                overflow: Some(overflow),
            }),
            Fit::Overflow(_) => Ok(rejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::token::Charset;

    const W: Charset = Charset::Windows1252;

    fn constraint(allocated_length: usize, allow_truncation: bool) -> SizeConstraint {
        SizeConstraint {
            allocated_length,
            padding: Padding::repeated(0x20, 1),
            allow_truncation,
        }
    }

    #[test]
    fn fit_pads_to_allocation() {
        match constraint(6, false).fit(b"abc") {
            Fit::Padded(bytes) => assert_eq!(bytes, b"abc   "),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            constraint(2, false).fit(b"abc"),
            Fit::Overflow(OverflowError {
                encoded: 3,
                allocated: 2
            })
        );
    }

    #[test]
    fn utf16_space_fills_whole_units() {
        let c = SizeConstraint {
            allocated_length: 9,
            padding: Padding::from_unit(vec![0x20, 0x00]),
            allow_truncation: false,
        };
        match c.fit(&[0x47, 0x00, 0x6F, 0x00]) {
            Fit::Padded(bytes) => assert_eq!(bytes, [0x47, 0x00, 0x6F, 0x00, 0x20, 0x00, 0x20, 0x00, 0x20]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn overflow_is_rejected_by_default() {
        let codec = Codec::new(W);
        let tokens = vec![Token::literal("Stand up, Vanguard!", W), Token::Terminator];
        let out = constraint(8, false).fit_tokens(&codec, &tokens).unwrap();
        assert_eq!(out.outcome, PatchOutcome::Rejected);
        assert_eq!(out.bytes, None);
        assert_eq!(out.encoded_length, 20);
        assert_eq!(
            out.overflow,
            Some(OverflowError {
                encoded: 20,
                allocated: 8
            })
        );
    }

    #[test]
    fn truncation_cuts_at_token_boundary_and_keeps_terminator() {
        let codec = Codec::new(W);
        let tokens = vec![
            Token::literal("Ride", W),
            Token::LineBreak,
            Token::literal("the vanguard", W),
            Token::Terminator,
        ];
        let out = constraint(8, true).fit_tokens(&codec, &tokens).unwrap();
        assert_eq!(out.outcome, PatchOutcome::Truncated);
        assert_eq!(out.kept, vec![Token::literal("Ride", W), Token::LineBreak, Token::Terminator]);
        assert_eq!(out.dropped, vec![Token::literal("the vanguard", W)]);
        assert_eq!(out.bytes.as_deref(), Some(&b"Ride\n\0  "[..]));
    }

    #[test]
    fn truncation_to_nothing_is_a_rejection() {
        let codec = Codec::new(W);
        let tokens = vec![Token::literal("Imaginary Gift", W), Token::Terminator];
        let out = constraint(4, true).fit_tokens(&codec, &tokens).unwrap();
        assert_eq!(out.outcome, PatchOutcome::Rejected);
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn unencodable_target_surfaces_as_encoding_error() {
        let codec = Codec::new(W);
        let tokens = vec![Token::literal("ライド", W)];
        let err = constraint(64, false).fit_tokens(&codec, &tokens).unwrap_err();
        assert_eq!(err.issues.len(), 3);
    }
}
