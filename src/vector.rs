//! Host-side containers handed to and from the engine.
//!
//! A [`HostArray`] is a contiguous, typed sequence. Scalars and `Vec`s of the
//! five supported primitive types convert into it; [`Element`] converts back.

use std::fmt;

use crate::error::{HelmError, Result};

/// Numeric element kind of a packed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float64,
}

impl ElementType {
    pub fn is_integer(self) -> bool {
        !matches!(self, ElementType::Float64)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, ElementType::Int32 | ElementType::Int64 | ElementType::Float64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Int32 => "i32",
            ElementType::UInt32 => "u32",
            ElementType::Int64 => "i64",
            ElementType::UInt64 => "u64",
            ElementType::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// A typed host array. Order and count are preserved across every conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float64(Vec<f64>),
}

impl HostArray {
    pub fn element_type(&self) -> ElementType {
        match self {
            HostArray::Int32(_) => ElementType::Int32,
            HostArray::UInt32(_) => ElementType::UInt32,
            HostArray::Int64(_) => ElementType::Int64,
            HostArray::UInt64(_) => ElementType::UInt64,
            HostArray::Float64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostArray::Int32(v) => v.len(),
            HostArray::UInt32(v) => v.len(),
            HostArray::Int64(v) => v.len(),
            HostArray::UInt64(v) => v.len(),
            HostArray::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            HostArray::Int32(v) => v.truncate(len),
            HostArray::UInt32(v) => v.truncate(len),
            HostArray::Int64(v) => v.truncate(len),
            HostArray::UInt64(v) => v.truncate(len),
            HostArray::Float64(v) => v.truncate(len),
        }
    }

    /// Converts into `Vec<T>`, failing if `T` is not the stored element type.
    pub fn into_vec<T: Element>(self) -> Result<Vec<T>> {
        T::from_host(self)
    }

    /// Element at `index` widened to `f64`.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            HostArray::Int32(v) => v.get(index).map(|&x| x as f64),
            HostArray::UInt32(v) => v.get(index).map(|&x| x as f64),
            HostArray::Int64(v) => v.get(index).map(|&x| x as f64),
            HostArray::UInt64(v) => v.get(index).map(|&x| x as f64),
            HostArray::Float64(v) => v.get(index).copied(),
        }
    }

    /// All elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get_f64(i)).collect()
    }

    fn format_at(&self, index: usize, precision: usize) -> String {
        match self {
            HostArray::Int32(v) => v[index].to_string(),
            HostArray::UInt32(v) => v[index].to_string(),
            HostArray::Int64(v) => v[index].to_string(),
            HostArray::UInt64(v) => v[index].to_string(),
            HostArray::Float64(v) => format!("{:.*}", precision, v[index]),
        }
    }
}

/// Primitive element types that can be packed into a [`HostArray`].
pub trait Element: Copy + Send + Sync + 'static {
    const TYPE: ElementType;

    fn into_host(values: Vec<Self>) -> HostArray;
    fn from_host(array: HostArray) -> Result<Vec<Self>>;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$variant;

                fn into_host(values: Vec<Self>) -> HostArray {
                    HostArray::$variant(values)
                }

                fn from_host(array: HostArray) -> Result<Vec<Self>> {
                    match array {
                        HostArray::$variant(values) => Ok(values),
                        other => Err(HelmError::ElementTypeMismatch {
                            expected: ElementType::$variant,
                            found: other.element_type(),
                        }),
                    }
                }
            }

            impl From<Vec<$ty>> for HostArray {
                fn from(values: Vec<$ty>) -> Self {
                    HostArray::$variant(values)
                }
            }

            impl From<&[$ty]> for HostArray {
                fn from(values: &[$ty]) -> Self {
                    HostArray::$variant(values.to_vec())
                }
            }

            impl<const N: usize> From<[$ty; N]> for HostArray {
                fn from(values: [$ty; N]) -> Self {
                    HostArray::$variant(values.to_vec())
                }
            }

            impl From<$ty> for HostArray {
                fn from(value: $ty) -> Self {
                    HostArray::$variant(vec![value])
                }
            }
        )*
    };
}

impl_element! {
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Float64,
}

/// Default number of leading and trailing elements shown by [`render_vector`].
pub const DEFAULT_PRINT_SIZE: usize = 4;
/// Default number of decimals shown for floating-point elements.
pub const DEFAULT_PRECISION: usize = 5;

fn render_range(array: &HostArray, start: usize, end: usize, print_size: usize, precision: usize) -> String {
    let len = end - start;
    let mut cells: Vec<String> = Vec::new();
    if len <= 2 * print_size {
        cells.extend((start..end).map(|i| array.format_at(i, precision)));
    } else {
        cells.extend((start..start + print_size).map(|i| array.format_at(i, precision)));
        cells.push("...".to_string());
        cells.extend((end - print_size..end).map(|i| array.format_at(i, precision)));
    }
    format!("[ {} ]", cells.join(", "))
}

/// Bounded one-line preview: the first and last `print_size` elements.
pub fn render_vector(array: &HostArray, print_size: usize, precision: usize) -> String {
    if array.is_empty() {
        return "[ ]".to_string();
    }
    render_range(array, 0, array.len(), print_size.max(1), precision)
}

/// Row-major matrix preview with `row_size` columns. At most `print_size`
/// leading and trailing rows are shown, each bounded like [`render_vector`].
pub fn render_matrix(array: &HostArray, row_size: usize, print_size: usize) -> String {
    if array.is_empty() || row_size == 0 {
        return "[ ]".to_string();
    }
    let print_size = print_size.max(1);
    let rows = array.len().div_ceil(row_size);
    let render_row = |row: usize| {
        let start = row * row_size;
        let end = (start + row_size).min(array.len());
        format!("    {}", render_range(array, start, end, print_size, DEFAULT_PRECISION))
    };

    let mut lines = Vec::new();
    if rows <= 2 * print_size {
        lines.extend((0..rows).map(render_row));
    } else {
        lines.extend((0..print_size).map(render_row));
        lines.push("    ...".to_string());
        lines.extend((rows - print_size..rows).map(render_row));
    }
    lines.join("\n")
}
