// src/core/storage/zset/border.rs

//! Score range borders for `ZRANGEBYSCORE`-style queries.

use crate::core::CitrineError;

/// A `ScoreBorder` is one end of a score range: a concrete value (inclusive or
/// exclusive) or one of the two infinity singletons.
///
/// Accepted forms: `2.718`, `-2`, `(2.718` (exclusive), `inf`, `+inf`, `-inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBorder {
    NegInf,
    PosInf,
    Value { value: f64, exclusive: bool },
}

impl ScoreBorder {
    /// Parses a raw argument into a border. Invalid floats produce a typed error.
    pub fn parse(raw: &[u8]) -> Result<Self, CitrineError> {
        let s = std::str::from_utf8(raw).map_err(|_| CitrineError::InvalidRangeBorder)?;
        match s {
            "inf" | "+inf" => return Ok(ScoreBorder::PosInf),
            "-inf" => return Ok(ScoreBorder::NegInf),
            _ => {}
        }
        if let Some(rest) = s.strip_prefix('(') {
            let value = rest
                .parse::<f64>()
                .map_err(|_| CitrineError::InvalidRangeBorder)?;
            return Ok(ScoreBorder::Value {
                value,
                exclusive: true,
            });
        }
        let value = s
            .parse::<f64>()
            .map_err(|_| CitrineError::InvalidRangeBorder)?;
        Ok(ScoreBorder::Value {
            value,
            exclusive: false,
        })
    }

    /// True when this border, used as an upper bound, admits `score`.
    pub fn gte(&self, score: f64) -> bool {
        match self {
            ScoreBorder::NegInf => false,
            ScoreBorder::PosInf => true,
            ScoreBorder::Value { value, exclusive } => {
                if *exclusive {
                    *value > score
                } else {
                    *value >= score
                }
            }
        }
    }

    /// True when this border, used as a lower bound, admits `score`.
    pub fn lte(&self, score: f64) -> bool {
        match self {
            ScoreBorder::NegInf => true,
            ScoreBorder::PosInf => false,
            ScoreBorder::Value { value, exclusive } => {
                if *exclusive {
                    *value < score
                } else {
                    *value <= score
                }
            }
        }
    }
}

/// True when no score can satisfy `min <= score <= max`.
pub fn range_is_empty(min: &ScoreBorder, max: &ScoreBorder) -> bool {
    match (min, max) {
        (ScoreBorder::PosInf, _) | (_, ScoreBorder::NegInf) => true,
        (
            ScoreBorder::Value {
                value: lo,
                exclusive: lo_ex,
            },
            ScoreBorder::Value {
                value: hi,
                exclusive: hi_ex,
            },
        ) => lo > hi || (lo == hi && (*lo_ex || *hi_ex)),
        _ => false,
    }
}
