//! Island Coordinates
//!
//! 2D point on the shared island plane. Avatars and tasks each own
//! their position; a move replaces the value wholesale.

use std::fmt;
use std::ops::{Add, Sub};
use serde::{Serialize, Deserialize};

/// Point on the island plane.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Position {
    /// Island origin.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new position.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Move this point to new coordinates.
    #[inline]
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    /// Offset by a displacement.
    #[inline]
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Round both coordinates to the nearest whole unit.
    #[inline]
    pub fn rounded(self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
        }
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Check whether `other` lies within `radius` (inclusive).
    #[inline]
    pub fn is_within(self, other: Self, radius: f64) -> bool {
        self.distance_squared(other) <= radius * radius
    }

    /// Both coordinates are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamp both coordinates to a square centred on the origin.
    #[inline]
    pub fn clamp_to_island(self, half_extent: f64) -> Self {
        Self {
            x: self.x.clamp(-half_extent, half_extent),
            y: self.y.clamp(-half_extent, half_extent),
        }
    }
}

impl Add for Position {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.translate(rhs.x, rhs.y)
    }
}

impl Sub for Position {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.translate(-rhs.x, -rhs.y)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({:.2}, {:.2})", self.x, self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_to() {
        let mut p = Position::new(1.0, 2.0);
        p.move_to(5.0, -3.0);
        assert_eq!(p, Position::new(5.0, -3.0));
    }

    #[test]
    fn test_distance() {
        // 3-4-5 triangle
        let a = Position::ORIGIN;
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_squared(b), 25.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(b.distance(a), 5.0);
    }

    #[test]
    fn test_is_within_inclusive() {
        let a = Position::ORIGIN;
        assert!(a.is_within(Position::new(5.0, 5.0), 20.0));
        assert!(a.is_within(Position::new(20.0, 0.0), 20.0));
        assert!(!a.is_within(Position::new(20.1, 0.0), 20.0));
        assert!(!a.is_within(Position::new(1000.0, 1000.0), 20.0));
    }

    #[test]
    fn test_rounded() {
        let p = Position::new(1.4, -2.6).rounded();
        assert_eq!(p, Position::new(1.0, -3.0));
    }

    #[test]
    fn test_operators() {
        let a = Position::new(3.0, 4.0);
        let b = Position::new(1.0, 2.0);
        assert_eq!(a + b, Position::new(4.0, 6.0));
        assert_eq!(a - b, Position::new(2.0, 2.0));
    }

    #[test]
    fn test_clamp_to_island() {
        let inside = Position::new(10.0, -20.0);
        assert_eq!(inside.clamp_to_island(150.0), inside);

        let outside = Position::new(400.0, -400.0).clamp_to_island(150.0);
        assert_eq!(outside, Position::new(150.0, -150.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Position::new(1.5, 2.0).to_string(), "(1.5, 2)");
    }
}
