//! Zone code grammar and hierarchical containment.
//!
//! Codes are uppercase ASCII and encode their own tier:
//!
//! - city: `BJ` (2-8 letters)
//! - school: `BJ01` (city letters + 2-4 digits)
//! - area: `BJ01-A2` (school + `-` + letter + 1-3 digits)
//! - building: `BJ01-A2-B03` (area + `-` + 1-4 letters/digits)
//!
//! A zone contains another when its tier path is a prefix of the other's.

use std::fmt;

use crate::error::AppError;
use crate::models::zone::ZoneType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZonePath {
    segments: Vec<String>,
}

impl ZonePath {
    pub fn parse(code: &str) -> Option<Self> {
        let mut parts = code.split('-');
        let head = parts.next()?;

        let letters: String = head.chars().take_while(|c| c.is_ascii_uppercase()).collect();
        let digits = &head[letters.len()..];

        if !(2..=8).contains(&letters.len()) {
            return None;
        }

        let mut segments = vec![letters];

        if digits.is_empty() {
            return match parts.next() {
                None => Some(Self { segments }),
                Some(_) => None,
            };
        }

        if !(2..=4).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        segments.push(digits.to_string());

        if let Some(area) = parts.next() {
            if !is_area_segment(area) {
                return None;
            }
            segments.push(area.to_string());
        }

        if let Some(building) = parts.next() {
            if !is_building_segment(building) {
                return None;
            }
            segments.push(building.to_string());
        }

        if parts.next().is_some() {
            return None;
        }

        Some(Self { segments })
    }

    pub fn zone_type(&self) -> ZoneType {
        match self.segments.len() {
            1 => ZoneType::City,
            2 => ZoneType::School,
            3 => ZoneType::Area,
            _ => ZoneType::Building,
        }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn contains(&self, other: &ZonePath) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// The enclosing zone one tier up; `None` for a city.
    pub fn parent(&self) -> Option<ZonePath> {
        if self.segments.len() <= 1 {
            return None;
        }

        Some(ZonePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for ZonePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx >= 2 {
                f.write_str("-")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

fn is_area_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest: Vec<char> = chars.collect();

    first.is_ascii_uppercase()
        && (1..=3).contains(&rest.len())
        && rest.iter().all(|c| c.is_ascii_digit())
}

fn is_building_segment(segment: &str) -> bool {
    (1..=4).contains(&segment.len())
        && segment
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Checks that `code` is well formed and structurally of `zone_type`.
pub fn validate(zone_type: ZoneType, code: &str) -> Result<ZonePath, AppError> {
    match ZonePath::parse(code) {
        Some(path) if path.zone_type() == zone_type => Ok(path),
        _ => Err(AppError::InvalidZoneFormat {
            zone_type,
            code: code.to_string(),
        }),
    }
}

/// True when `inner` lies within (or equals) `outer`.
pub fn contains(outer: &str, inner: &str) -> bool {
    if outer == inner {
        return true;
    }

    match (ZonePath::parse(outer), ZonePath::parse(inner)) {
        (Some(outer), Some(inner)) => outer.contains(&inner),
        _ => false,
    }
}

/// Tiers between a covering zone and the zone it covers; 0 means exact.
pub fn specificity(outer: &str, inner: &str) -> Option<usize> {
    if outer == inner {
        return Some(0);
    }

    let outer = ZonePath::parse(outer)?;
    let inner = ZonePath::parse(inner)?;

    if outer.contains(&inner) {
        Some(inner.depth() - outer.depth())
    } else {
        None
    }
}

/// The code one tier up, used when a worker is promoted.
pub fn parent_code(code: &str) -> Option<String> {
    ZonePath::parse(code)?.parent().map(|path| path.to_string())
}
