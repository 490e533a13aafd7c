//! Bounds-described homogeneous arrays.
//!
//! A [`SafeArray`] carries its element type and per-dimension bounds in its
//! own descriptor. Elements are reached either one at a time through
//! [`SafeArray::get_element`] / [`SafeArray::put_element`], or in bulk
//! through the scoped [`ArrayAccess`] guard returned by
//! [`SafeArray::access_data`]. The guard releases access when dropped, so
//! every exit path of the code holding it unlocks the array.
//!
//! Multi-dimensional data is stored with the first index varying fastest.

use crate::bstr::BStr;
use crate::error::{ComError, ComResult};
use crate::record::RecordInfo;
use crate::record::RecordValue;
use crate::variant::{VarType, Variant, VariantBool};
use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Bounds of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeArrayBound {
    pub elements: u32,
    pub lower_bound: i32,
}

impl SafeArrayBound {
    pub fn new(elements: u32, lower_bound: i32) -> Self {
        Self {
            elements,
            lower_bound,
        }
    }

    /// Inclusive upper bound. One below the lower bound when the dimension
    /// is empty.
    pub fn upper_bound(&self) -> i64 {
        i64::from(self.lower_bound) + i64::from(self.elements) - 1
    }

    /// Whether every index of the dimension is addressable as `i32`.
    fn is_addressable(&self) -> bool {
        self.upper_bound() <= i64::from(i32::MAX)
    }
}

/// Backing storage, one vector per supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayStorage {
    I2(Vec<i16>),
    I4(Vec<i32>),
    Ui4(Vec<u32>),
    R8(Vec<f64>),
    Bool(Vec<VariantBool>),
    Bstr(Vec<BStr>),
    Variant(Vec<Variant>),
    Record(Vec<RecordValue>),
}

impl ArrayStorage {
    fn zeroed(vt: VarType, count: usize) -> ComResult<Self> {
        Ok(match vt {
            VarType::I2 => ArrayStorage::I2(vec![0; count]),
            VarType::I4 => ArrayStorage::I4(vec![0; count]),
            VarType::Ui4 => ArrayStorage::Ui4(vec![0; count]),
            VarType::R8 => ArrayStorage::R8(vec![0.0; count]),
            VarType::Bool => ArrayStorage::Bool(vec![VariantBool::FALSE; count]),
            VarType::Bstr => ArrayStorage::Bstr(vec![BStr::null(); count]),
            VarType::Variant => ArrayStorage::Variant(vec![Variant::Empty; count]),
            other => {
                return Err(ComError::InvalidArg(format!(
                    "arrays of {} cannot be created without a descriptor",
                    other
                )))
            }
        })
    }

    fn element(&self, index: usize) -> Variant {
        match self {
            ArrayStorage::I2(v) => Variant::I2(v[index]),
            ArrayStorage::I4(v) => Variant::I4(v[index]),
            ArrayStorage::Ui4(v) => Variant::Ui4(v[index]),
            ArrayStorage::R8(v) => Variant::R8(v[index]),
            ArrayStorage::Bool(v) => Variant::Bool(v[index]),
            ArrayStorage::Bstr(v) => Variant::Bstr(v[index].clone()),
            ArrayStorage::Variant(v) => v[index].clone(),
            ArrayStorage::Record(v) => Variant::Record(v[index].clone()),
        }
    }

    /// Store an already converted value. Returns false on a tag mismatch.
    fn set_element(&mut self, index: usize, value: Variant) -> bool {
        match (self, value) {
            (ArrayStorage::I2(v), Variant::I2(x)) => v[index] = x,
            (ArrayStorage::I4(v), Variant::I4(x)) => v[index] = x,
            (ArrayStorage::Ui4(v), Variant::Ui4(x)) => v[index] = x,
            (ArrayStorage::R8(v), Variant::R8(x)) => v[index] = x,
            (ArrayStorage::Bool(v), Variant::Bool(x)) => v[index] = x,
            (ArrayStorage::Bstr(v), Variant::Bstr(x)) => v[index] = x,
            (ArrayStorage::Record(v), Variant::Record(x)) => v[index] = x,
            (ArrayStorage::Variant(v), x) => v[index] = x,
            _ => return false,
        }
        true
    }
}

/// Element types that can be reached through [`SafeArray::access_data`].
pub trait ArrayElement: Sized + Clone {
    /// Tag of arrays holding this element type.
    const VT: VarType;

    /// The typed slice, if `storage` holds this element type.
    fn slice(storage: &mut ArrayStorage) -> Option<&mut [Self]>;

    /// Wrap owned elements as storage.
    fn into_storage(values: Vec<Self>) -> ArrayStorage;
}

macro_rules! array_element {
    ($ty:ty, $vt:ident, $storage:ident) => {
        impl ArrayElement for $ty {
            const VT: VarType = VarType::$vt;

            fn slice(storage: &mut ArrayStorage) -> Option<&mut [Self]> {
                match storage {
                    ArrayStorage::$storage(values) => Some(values.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_storage(values: Vec<Self>) -> ArrayStorage {
                ArrayStorage::$storage(values)
            }
        }
    };
}

array_element!(i16, I2, I2);
array_element!(i32, I4, I4);
array_element!(u32, Ui4, Ui4);
array_element!(f64, R8, R8);
array_element!(VariantBool, Bool, Bool);
array_element!(BStr, Bstr, Bstr);
array_element!(Variant, Variant, Variant);
array_element!(RecordValue, Record, Record);

/// A homogeneous array whose bounds live in its descriptor.
///
/// Handles are apartment-affine: element access uses interior mutability
/// without locking, so the array cannot be shared across threads.
pub struct SafeArray {
    vt: VarType,
    bounds: Vec<SafeArrayBound>,
    record_info: Option<Arc<RecordInfo>>,
    storage: RefCell<ArrayStorage>,
    locks: Cell<u32>,
}

impl SafeArray {
    /// Create a zero-filled array of `vt` with the given bounds.
    pub fn create(vt: VarType, bounds: &[SafeArrayBound]) -> ComResult<Self> {
        let count = element_count(bounds)?;
        Ok(Self::from_parts(vt, bounds, None, ArrayStorage::zeroed(vt, count)?))
    }

    /// Create a one-dimensional zero-filled array.
    pub fn create_vector(vt: VarType, lower_bound: i32, elements: u32) -> ComResult<Self> {
        Self::create(vt, &[SafeArrayBound::new(elements, lower_bound)])
    }

    /// Create an array of records, each initialized by `info`.
    pub fn create_records(info: &Arc<RecordInfo>, bounds: &[SafeArrayBound]) -> ComResult<Self> {
        let count = element_count(bounds)?;
        let records = (0..count).map(|_| info.record_init()).collect();
        Ok(Self::from_parts(
            VarType::Record,
            bounds,
            Some(Arc::clone(info)),
            ArrayStorage::Record(records),
        ))
    }

    /// A zero-based vector holding `values`.
    pub fn from_vec<T: ArrayElement>(values: Vec<T>) -> ComResult<Self> {
        if T::VT == VarType::Record {
            return Err(ComError::InvalidArg(
                "record arrays need a record descriptor".to_string(),
            ));
        }
        let elements = u32::try_from(values.len()).map_err(|_| ComError::OutOfMemory)?;
        element_count(&[SafeArrayBound::new(elements, 0)])?;
        Ok(Self::from_parts(
            T::VT,
            &[SafeArrayBound::new(elements, 0)],
            None,
            T::into_storage(values),
        ))
    }

    /// A zero-based vector of records described by `info`.
    pub fn from_records(info: &Arc<RecordInfo>, records: Vec<RecordValue>) -> ComResult<Self> {
        if let Some(stranger) = records.iter().find(|r| !info.is_matching_type(r.info())) {
            return Err(ComError::InvalidArg(format!(
                "record {} does not belong in an array of {}",
                stranger.info().name(),
                info.name()
            )));
        }
        let elements = u32::try_from(records.len()).map_err(|_| ComError::OutOfMemory)?;
        element_count(&[SafeArrayBound::new(elements, 0)])?;
        Ok(Self::from_parts(
            VarType::Record,
            &[SafeArrayBound::new(elements, 0)],
            Some(Arc::clone(info)),
            ArrayStorage::Record(records),
        ))
    }

    fn from_parts(
        vt: VarType,
        bounds: &[SafeArrayBound],
        record_info: Option<Arc<RecordInfo>>,
        storage: ArrayStorage,
    ) -> Self {
        Self {
            vt,
            bounds: bounds.to_vec(),
            record_info,
            storage: RefCell::new(storage),
            locks: Cell::new(0),
        }
    }

    /// Element type.
    pub fn vt(&self) -> VarType {
        self.vt
    }

    /// Number of dimensions.
    pub fn dims(&self) -> u32 {
        self.bounds.len() as u32
    }

    pub fn bounds(&self) -> &[SafeArrayBound] {
        &self.bounds
    }

    /// Descriptor of the element record type, for record arrays.
    pub fn record_info(&self) -> Option<&Arc<RecordInfo>> {
        self.record_info.as_ref()
    }

    /// Lower bound of dimension `dim` (1-based).
    pub fn lower_bound(&self, dim: u32) -> ComResult<i32> {
        Ok(self.bound(dim)?.lower_bound)
    }

    /// Inclusive upper bound of dimension `dim` (1-based).
    pub fn upper_bound(&self, dim: u32) -> ComResult<i32> {
        let upper = self.bound(dim)?.upper_bound();
        i32::try_from(upper)
            .map_err(|_| ComError::InvalidArg(format!("upper bound {} out of range", upper)))
    }

    fn bound(&self, dim: u32) -> ComResult<&SafeArrayBound> {
        dim.checked_sub(1)
            .and_then(|d| self.bounds.get(d as usize))
            .ok_or(ComError::BadIndex(dim))
    }

    /// Total number of elements across all dimensions.
    pub fn element_count(&self) -> usize {
        self.bounds.iter().map(|b| b.elements as usize).product()
    }

    /// Number of outstanding [`ArrayAccess`] guards.
    pub fn lock_count(&self) -> u32 {
        self.locks.get()
    }

    /// Whether the data is currently being accessed.
    pub fn is_locked(&self) -> bool {
        self.locks.get() > 0
    }

    /// Read one element; `indices` has one entry per dimension.
    pub fn get_element(&self, indices: &[i32]) -> ComResult<Variant> {
        let offset = self.offset(indices)?;
        let storage = self.storage.try_borrow().map_err(|_| ComError::ArrayLocked)?;
        Ok(storage.element(offset))
    }

    /// Write one element, converting `value` to the element type.
    pub fn put_element(&self, indices: &[i32], value: Variant) -> ComResult<()> {
        let offset = self.offset(indices)?;
        let converted = match (&self.record_info, value) {
            (Some(info), Variant::Record(record)) if info.is_matching_type(record.info()) => {
                Some(Variant::Record(record))
            }
            (Some(_), _) => None,
            (None, value) => value.change_type(self.vt),
        };
        let mismatch = || ComError::TypeMismatch {
            arg: 0,
            expected: self.vt.to_string(),
        };
        let converted = converted.ok_or_else(mismatch)?;
        let mut storage = self
            .storage
            .try_borrow_mut()
            .map_err(|_| ComError::ArrayLocked)?;
        if storage.set_element(offset, converted) {
            Ok(())
        } else {
            Err(mismatch())
        }
    }

    /// Copy the elements out in storage order.
    pub fn to_vec<T: ArrayElement>(&self) -> ComResult<Vec<T>> {
        Ok(self.access_data::<T>()?.to_vec())
    }

    /// Acquire scoped access to the elements as a typed slice.
    ///
    /// Fails with [`ComError::ArrayLocked`] while another guard is alive and
    /// with [`ComError::TypeMismatch`] when `T` is not the element type. No
    /// guard is produced on failure, so nothing needs releasing.
    pub fn access_data<T: ArrayElement>(&self) -> ComResult<ArrayAccess<'_, T>> {
        let mismatch = || ComError::TypeMismatch {
            arg: 0,
            expected: self.vt.to_string(),
        };
        if T::VT != self.vt {
            return Err(mismatch());
        }
        let storage = self
            .storage
            .try_borrow_mut()
            .map_err(|_| ComError::ArrayLocked)?;
        let data = RefMut::filter_map(storage, T::slice).map_err(|_| mismatch())?;
        self.locks.set(self.locks.get() + 1);
        Ok(ArrayAccess {
            data,
            locks: &self.locks,
        })
    }

    fn offset(&self, indices: &[i32]) -> ComResult<usize> {
        if indices.len() != self.bounds.len() {
            return Err(ComError::BadIndex(indices.len() as u32));
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (dim, (&index, bound)) in indices.iter().zip(&self.bounds).enumerate() {
            let relative = i64::from(index) - i64::from(bound.lower_bound);
            if relative < 0 || relative >= i64::from(bound.elements) {
                return Err(ComError::BadIndex(dim as u32 + 1));
            }
            offset += relative as usize * stride;
            stride *= bound.elements as usize;
        }
        Ok(offset)
    }
}

fn element_count(bounds: &[SafeArrayBound]) -> ComResult<usize> {
    if bounds.is_empty() {
        return Err(ComError::InvalidArg(
            "an array needs at least one dimension".to_string(),
        ));
    }
    if let Some(bound) = bounds.iter().find(|b| !b.is_addressable()) {
        return Err(ComError::InvalidArg(format!(
            "{} elements from lower bound {} overflow the index range",
            bound.elements, bound.lower_bound
        )));
    }
    bounds
        .iter()
        .try_fold(1usize, |acc, b| acc.checked_mul(b.elements as usize))
        .ok_or(ComError::OutOfMemory)
}

/// Deep copy. Panics if called while an [`ArrayAccess`] guard on `self` is
/// alive, like any `RefCell` borrow conflict.
impl Clone for SafeArray {
    fn clone(&self) -> Self {
        Self::from_parts(
            self.vt,
            &self.bounds,
            self.record_info.clone(),
            self.storage.borrow().clone(),
        )
    }
}

impl PartialEq for SafeArray {
    fn eq(&self, other: &Self) -> bool {
        if self.vt != other.vt || self.bounds != other.bounds {
            return false;
        }
        match (self.storage.try_borrow(), other.storage.try_borrow()) {
            (Ok(a), Ok(b)) => *a == *b,
            _ => false,
        }
    }
}

impl fmt::Debug for SafeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SafeArray");
        s.field("vt", &self.vt).field("bounds", &self.bounds);
        match self.storage.try_borrow() {
            Ok(storage) => s.field("data", &*storage),
            Err(_) => s.field("data", &"<locked>"),
        };
        s.finish()
    }
}

/// Scoped access to the elements of a [`SafeArray`].
///
/// Dereferences to the typed element slice. Dropping the guard releases
/// access.
pub struct ArrayAccess<'a, T> {
    data: RefMut<'a, [T]>,
    locks: &'a Cell<u32>,
}

impl<T> Deref for ArrayAccess<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for ArrayAccess<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Drop for ArrayAccess<'_, T> {
    fn drop(&mut self) {
        self.locks.set(self.locks.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::Guid;
    use crate::typespec::TypeSpec;

    #[test]
    fn test_vector_bounds() {
        let array = SafeArray::create_vector(VarType::R8, 1, 5).unwrap();
        assert_eq!(array.dims(), 1);
        assert_eq!(array.lower_bound(1).unwrap(), 1);
        assert_eq!(array.upper_bound(1).unwrap(), 5);
        assert_eq!(array.element_count(), 5);
        assert!(matches!(array.lower_bound(2), Err(ComError::BadIndex(2))));
    }

    #[test]
    fn test_bounds_past_index_range_are_refused() {
        let err = SafeArray::create_vector(VarType::R8, i32::MAX, 2).unwrap_err();
        assert!(matches!(err, ComError::InvalidArg(_)));
        assert!(SafeArray::create(VarType::I4, &[SafeArrayBound::new(4, i32::MAX - 2)]).is_err());

        let last = SafeArray::create_vector(VarType::R8, i32::MAX, 1).unwrap();
        assert_eq!(last.upper_bound(1).unwrap(), i32::MAX);
        let empty = SafeArray::create_vector(VarType::R8, i32::MIN, 0).unwrap();
        assert_eq!(empty.element_count(), 0);
        assert!(empty.upper_bound(1).is_err());
    }

    #[test]
    fn test_bound_arithmetic_is_wide() {
        assert_eq!(SafeArrayBound::new(u32::MAX, 0).upper_bound(), i64::from(u32::MAX) - 1);
        assert_eq!(SafeArrayBound::new(2, i32::MAX).upper_bound(), i64::from(i32::MAX) + 1);
        assert_eq!(SafeArrayBound::new(0, 0).upper_bound(), -1);
    }

    #[test]
    fn test_access_guard_releases_on_drop() {
        let array = SafeArray::create_vector(VarType::R8, 0, 3).unwrap();
        {
            let mut data = array.access_data::<f64>().unwrap();
            assert_eq!(array.lock_count(), 1);
            for (i, value) in data.iter_mut().enumerate() {
                *value = i as f64;
            }
        }
        assert_eq!(array.lock_count(), 0);
        assert_eq!(array.to_vec::<f64>().unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_second_access_is_refused() {
        let array = SafeArray::create_vector(VarType::I4, 0, 2).unwrap();
        let _guard = array.access_data::<i32>().unwrap();
        assert!(matches!(array.access_data::<i32>(), Err(ComError::ArrayLocked)));
        assert!(matches!(array.get_element(&[0]), Err(ComError::ArrayLocked)));
        assert_eq!(array.lock_count(), 1);
    }

    #[test]
    fn test_wrong_element_type_is_refused() {
        let array = SafeArray::create_vector(VarType::I4, 0, 2).unwrap();
        assert!(matches!(
            array.access_data::<f64>(),
            Err(ComError::TypeMismatch { .. })
        ));
        assert_eq!(array.lock_count(), 0);
    }

    #[test]
    fn test_multi_dimensional_layout() {
        let bounds = [SafeArrayBound::new(2, 0), SafeArrayBound::new(3, 1)];
        let array = SafeArray::create(VarType::I4, &bounds).unwrap();
        array.put_element(&[1, 1], Variant::I4(10)).unwrap();
        array.put_element(&[0, 2], Variant::I4(20)).unwrap();

        assert_eq!(array.to_vec::<i32>().unwrap(), vec![0, 10, 20, 0, 0, 0]);
        assert_eq!(array.get_element(&[0, 2]).unwrap(), Variant::I4(20));
        assert!(matches!(array.get_element(&[2, 1]), Err(ComError::BadIndex(1))));
        assert!(matches!(array.get_element(&[0, 0]), Err(ComError::BadIndex(2))));
    }

    #[test]
    fn test_put_element_converts() {
        let array = SafeArray::create_vector(VarType::R8, 0, 1).unwrap();
        array.put_element(&[0], Variant::I4(4)).unwrap();
        assert_eq!(array.get_element(&[0]).unwrap(), Variant::R8(4.0));
        assert!(array.put_element(&[0], Variant::from("x")).is_err());
    }

    #[test]
    fn test_clone_is_deep() {
        let array = SafeArray::from_vec(vec![1.0, 2.0]).unwrap();
        let copy = array.clone();
        array.access_data::<f64>().unwrap()[0] = 9.0;
        assert_eq!(copy.to_vec::<f64>().unwrap(), vec![1.0, 2.0]);
        assert_ne!(copy, array);
    }

    #[test]
    fn test_record_arrays() {
        let fields = vec![("id".to_string(), TypeSpec::I4)];
        let info = Arc::new(RecordInfo::new("Item", Guid::generate(), &fields, |_| None).unwrap());
        let array = SafeArray::create_records(&info, &[SafeArrayBound::new(2, 0)]).unwrap();

        let mut item = info.record_init();
        item.set("id", Variant::I4(7)).unwrap();
        array.put_element(&[1], Variant::Record(item)).unwrap();

        let items = array.to_vec::<RecordValue>().unwrap();
        assert_eq!(items[1].field("id").unwrap(), &Variant::I4(7));
        assert!(array.put_element(&[0], Variant::I4(1)).is_err());
        assert!(SafeArray::from_vec(items).is_err());
    }

    #[test]
    fn test_empty_bounds_rejected() {
        assert!(SafeArray::create(VarType::I4, &[]).is_err());
        assert!(SafeArray::create(VarType::Record, &[SafeArrayBound::new(1, 0)]).is_err());
    }
}
