//! The [Measure] capability: what a value must expose so [super::SizeEstimator] may compute its deep footprint.

use std::fmt::{Display, Formatter};


/// How a value is treated by the profiler -- decides if it is measured at all ([Category::is_interesting()])
/// and if it may be traversed ([Category::Scalar] values never are).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Category {
    /// integers, floats, bools, chars & strings: measured, but never traversed
    Scalar,
    /// anything that may hold other values -- structs, collections, smart pointers...
    Composite,
    /// namespaces of code -- not produced by the std impls, available to user [Measure] impls
    Module,
    /// functions, closures & fn pointers
    Callable,
    /// files & other open I/O handles
    Stream,
    /// the absence of a value -- `None`
    Null,
    /// callables bound to a receiver -- not produced by the std impls, available to user [Measure] impls
    BoundMethod,
    /// attribute accessors -- not produced by the std impls, available to user [Measure] impls
    Descriptor,
    /// lazy sequences -- ranges & the like -- which would be "consumed" if traversed
    Generator,
    /// the profiler's own types
    ProfilerMarker,
}
impl Category {
    /// Tells if values of this category are eligible for measurement -- either as a candidate variable or as a referent.
    /// Modules, callables, streams, `None`, bound methods, descriptors, generators and the profiler's own types are not.
    pub fn is_interesting(&self) -> bool {
        matches!(self, Self::Scalar | Self::Composite)
    }
}

/// The traversal capability a value exhibits, used to dispatch the estimator's referent enumeration
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Shape {
    /// opaque: nothing to enumerate
    Atomic,
    /// named fields -- see [Measure::visit_fields()]
    Fields,
    /// elements -- see [Measure::visit_elements()]
    Elements,
}

/// Ephemeral identity of a value, valid only within a single [super::SizeEstimator::estimate()] call.\
/// The concrete type participates so a struct and its first field -- sharing the same address -- are told apart.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Identity {
    address:   usize,
    type_name: &'static str,
}
impl Identity {
    /// identity of a value living at its own address
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self::at(value as *const T as *const (), std::any::type_name::<T>())
    }
    /// identity of something living at `address` -- for shared pointers, the address of the shared allocation
    pub fn at(address: *const (), type_name: &'static str) -> Self {
        Self { address: address as usize, type_name }
    }
}

/// Failure of a [Measure::native_byte_len()] probe -- always recovered by the estimator
#[derive(Debug, thiserror::Error)]
#[error("native byte length probe failed: {0}")]
pub struct ProbeError(pub String);

/// Capability of being measured by the [super::SizeEstimator].
///
/// A value tells its [Category], its inline & directly owned heap sizes and, through [Self::shape()],
/// which of the [Self::visit_fields()] / [Self::visit_elements()] enumerations leads to the values it refers to.\
/// Implementations for the std scalars, strings, collections, smart pointers & cells are provided.
/// For user structs, see [crate::measure_fields!].
pub trait Measure {

    fn category(&self) -> Category {
        Category::Composite
    }

    /// Probe for values able to report their own total footprint -- raw buffers, arrays.\
    /// When it yields `Some(Ok(bytes))`, `bytes` is used as is and the value is not traversed;
    /// `None` or an error make the estimator fall back to the generic sizes.
    fn native_byte_len(&self) -> Option<Result<usize, ProbeError>> {
        None
    }

    /// bytes taken by the value's own representation, wherever it lives
    fn inline_size(&self) -> usize {
        std::mem::size_of_val(self)
    }

    /// bytes of heap storage owned directly by this value and not accounted for by any of its referents
    /// -- vector & string buffers, the allocation behind a `Box`, hash table slots...
    fn owned_heap_size(&self) -> usize {
        0
    }

    fn shape(&self) -> Shape {
        Shape::Atomic
    }

    /// Enumerates named referents -- called when [Self::shape()] is [Shape::Fields]
    fn visit_fields(&self, _visitor: &mut dyn FnMut(&str, &dyn Measure)) {}

    /// Enumerates anonymous referents -- called when [Self::shape()] is [Shape::Elements]
    fn visit_elements(&self, _visitor: &mut dyn FnMut(&dyn Measure)) {}

    fn identity(&self) -> Identity {
        Identity::of(self)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Scalar         => "scalar",
            Self::Composite      => "composite",
            Self::Module         => "module",
            Self::Callable       => "callable",
            Self::Stream         => "stream",
            Self::Null           => "null",
            Self::BoundMethod    => "bound method",
            Self::Descriptor     => "descriptor",
            Self::Generator      => "generator",
            Self::ProfilerMarker => "profiler marker",
        };
        write!(f, "{}", name)
    }
}

/// Implements [Measure] for a struct by enumerating the given fields, which must implement [Measure] themselves:
/// ```
///     use memprof::measure_fields;
///     struct Inventory {
///         names:  Vec<String>,
///         counts: std::collections::HashMap<String, u32>,
///     }
///     measure_fields!(Inventory { names, counts });
/// ```
#[macro_export]
macro_rules! measure_fields {
    ($type:ty { $($field:ident),* $(,)? }) => {
        impl $crate::size_estimator::Measure for $type {
            fn shape(&self) -> $crate::size_estimator::Shape {
                $crate::size_estimator::Shape::Fields
            }
            fn visit_fields(&self, visitor: &mut dyn FnMut(&str, &dyn $crate::size_estimator::Measure)) {
                $( visitor(stringify!($field), &self.$field); )*
            }
        }
    };
}
