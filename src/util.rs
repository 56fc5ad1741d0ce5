use alloc::vec::Vec;
use core::f32::consts::PI;
use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use libm::{atan2f, cosf, fmodf, sinf, sqrtf};

pub(crate) const SQRT_3: f32 = 1.732_050_8;

/// A space vector in some (possibly rotating) reference frame.
///
/// `d` is the direct (real) component, `q` the quadrature (imaginary) one.
/// The products follow complex arithmetic, so `a * b` rotates and scales `a`
/// by `b`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub d: f32,
    pub q: f32,
}

impl Vector {
    pub const ZERO: Vector = Vector { d: 0., q: 0. };

    pub const fn new(d: f32, q: f32) -> Self {
        Vector { d, q }
    }
    /// Unit vector at `angle` radians
    pub fn from_angle(angle: f32) -> Self {
        Vector {
            d: cosf(angle),
            q: sinf(angle),
        }
    }
    pub fn from_polar(magnitude: f32, angle: f32) -> Self {
        Vector::from_angle(angle) * magnitude
    }
    pub fn magnitude(self) -> f32 {
        sqrtf(self.magnitude_squared())
    }
    pub fn magnitude_squared(self) -> f32 {
        self.d * self.d + self.q * self.q
    }
    pub fn phase(self) -> f32 {
        atan2f(self.q, self.d)
    }
    pub fn conj(self) -> Self {
        Vector {
            d: self.d,
            q: -self.q,
        }
    }
    /// Multiplication by `j`
    pub fn perpendicular(self) -> Self {
        Vector {
            d: -self.q,
            q: self.d,
        }
    }
    /// Positive rotation of the vector, which is a negative rotation of the frame
    pub fn rotated(self, angle: f32) -> Self {
        self * Vector::from_angle(angle)
    }
    /// `Re(self * conj(other))`
    pub fn dot(self, other: Vector) -> f32 {
        self.d * other.d + self.q * other.q
    }
    /// `Im(conj(self) * other)`, so `Im(a * conj(b))` is `b.cross(a)`
    pub fn cross(self, other: Vector) -> f32 {
        self.d * other.q - self.q * other.d
    }
}

impl Add for Vector {
    type Output = Vector;
    fn add(self, rhs: Self) -> Self::Output {
        Vector {
            d: self.d + rhs.d,
            q: self.q + rhs.q,
        }
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, rhs: Self) {
        self.d += rhs.d;
        self.q += rhs.q;
    }
}

impl Sub for Vector {
    type Output = Vector;
    fn sub(self, rhs: Self) -> Self::Output {
        Vector {
            d: self.d - rhs.d,
            q: self.q - rhs.q,
        }
    }
}

impl Neg for Vector {
    type Output = Vector;
    fn neg(self) -> Self::Output {
        Vector {
            d: -self.d,
            q: -self.q,
        }
    }
}

impl Mul for Vector {
    type Output = Vector;
    fn mul(self, rhs: Self) -> Self::Output {
        Vector {
            d: self.d * rhs.d - self.q * rhs.q,
            q: self.d * rhs.q + self.q * rhs.d,
        }
    }
}

impl Mul<f32> for Vector {
    type Output = Vector;
    fn mul(self, rhs: f32) -> Self::Output {
        Vector {
            d: self.d * rhs,
            q: self.q * rhs,
        }
    }
}

impl Mul<Vector> for f32 {
    type Output = Vector;
    fn mul(self, rhs: Vector) -> Self::Output {
        rhs * self
    }
}

impl Div<f32> for Vector {
    type Output = Vector;
    fn div(self, rhs: f32) -> Self::Output {
        Vector {
            d: self.d / rhs,
            q: self.q / rhs,
        }
    }
}

/// Space vector of three phase quantities, peak-value scaled.
/// Any zero-sequence component is dropped.
pub fn to_vector(u: f32, v: f32, w: f32) -> Vector {
    Vector {
        d: 2. / 3. * u - (v + w) / 3.,
        q: (v - w) / SQRT_3,
    }
}

/// Phase quantities of a space vector, without zero-sequence component
pub fn to_phases(vector: Vector) -> [f32; 3] {
    [
        vector.d,
        0.5 * (-vector.d + SQRT_3 * vector.q),
        0.5 * (-vector.d - SQRT_3 * vector.q),
    ]
}

/// Wraps an angle into `[0, 2PI)`
pub(crate) fn wrap_angle(angle: f32) -> f32 {
    let wrapped = fmodf(angle, 2. * PI);
    if wrapped < 0. {
        // Rounding can land exactly on 2PI for tiny negative inputs
        let shifted = wrapped + 2. * PI;
        if shifted >= 2. * PI {
            0.
        } else {
            shifted
        }
    } else {
        wrapped
    }
}

/// Saturates `value` to `[-limit, limit]`, `limit` must be non-negative
pub(crate) fn saturate(value: f32, limit: f32) -> f32 {
    if value > limit {
        limit
    } else if value < -limit {
        -limit
    } else {
        value
    }
}

/// Piecewise linear table over a strictly increasing abscissa.
/// Arguments outside of the table are clamped to its end values.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lookup {
    x: Vec<f32>,
    y: Vec<f32>,
}

impl Lookup {
    /// Points that do not advance the abscissa are dropped
    pub(crate) fn from_points(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut x: Vec<f32> = Vec::new();
        let mut y = Vec::new();
        for (xi, yi) in points {
            if x.last().map_or(true, |last| xi > *last) {
                x.push(xi);
                y.push(yi);
            }
        }
        Lookup { x, y }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.x.len()
    }

    pub(crate) fn last(&self) -> Option<(f32, f32)> {
        Some((*self.x.last()?, *self.y.last()?))
    }

    pub(crate) fn eval(&self, at: f32) -> f32 {
        let n = self.x.len();
        if n == 0 {
            return 0.;
        }
        if !(at > self.x[0]) {
            return self.y[0];
        }
        if at >= self.x[n - 1] {
            return self.y[n - 1];
        }
        // First index with x > at, in 1..n
        let upper = self.x.partition_point(|xi| *xi <= at);
        let (x0, x1) = (self.x[upper - 1], self.x[upper]);
        let (y0, y1) = (self.y[upper - 1], self.y[upper]);
        y0 + (y1 - y0) * (at - x0) / (x1 - x0)
    }
}
