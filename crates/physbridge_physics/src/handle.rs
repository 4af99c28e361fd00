//! Solver-issued handles
//!
//! Handles are plain integer payloads handed out by the rigid-body solver.
//! The solver owns their validity; a handle is only meaningful between its
//! allocation and its removal.

use std::fmt;

/// Handle of a dynamic or kinematic body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Handle of an immovable static collidable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StaticHandle(pub u32);

/// Handle of a shape registered with the solver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeIndex(pub u32);

/// Handle of a constraint registered with the solver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(pub u32);

/// Any solver-tracked collidable: a body or a static
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollidableHandle {
    Body(BodyHandle),
    Static(StaticHandle),
}

impl CollidableHandle {
    /// Integer payload of the underlying handle
    #[inline]
    pub fn index(self) -> usize {
        match self {
            CollidableHandle::Body(h) => h.0 as usize,
            CollidableHandle::Static(h) => h.0 as usize,
        }
    }

    /// The body handle, if this collidable is a body
    #[inline]
    pub fn body(self) -> Option<BodyHandle> {
        match self {
            CollidableHandle::Body(h) => Some(h),
            CollidableHandle::Static(_) => None,
        }
    }

    /// Check whether this is a static collidable
    #[inline]
    pub fn is_static(self) -> bool {
        matches!(self, CollidableHandle::Static(_))
    }
}

impl From<BodyHandle> for CollidableHandle {
    fn from(h: BodyHandle) -> Self {
        CollidableHandle::Body(h)
    }
}

impl From<StaticHandle> for CollidableHandle {
    fn from(h: StaticHandle) -> Self {
        CollidableHandle::Static(h)
    }
}

impl fmt::Display for CollidableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollidableHandle::Body(h) => write!(f, "body#{}", h.0),
            CollidableHandle::Static(h) => write!(f, "static#{}", h.0),
        }
    }
}

/// An ordered pair of collidables as reported by the narrow phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollidablePair {
    pub a: CollidableHandle,
    pub b: CollidableHandle,
}

impl CollidablePair {
    pub fn new(a: impl Into<CollidableHandle>, b: impl Into<CollidableHandle>) -> Self {
        Self { a: a.into(), b: b.into() }
    }

    /// The same pair seen from `b`'s side
    #[inline]
    pub fn flipped(self) -> Self {
        Self { a: self.b, b: self.a }
    }
}
