//! Labeled-array datasets.

use crate::error::{Atl11Error, Result};
use indexmap::IndexMap;
use ndarray::{Array1, ArrayD};
use std::fmt;

/// Attribute value attached to a dataset or variable.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Single string.
    Text(String),
    /// String list.
    Texts(Vec<String>),
    /// Single integer.
    Int(i64),
    /// Integer list.
    Ints(Vec<i64>),
    /// Single float.
    Float(f64),
    /// Float list.
    Floats(Vec<f64>),
}

impl AttrValue {
    /// Numeric value of a scalar attribute.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Ints(v) if v.len() == 1 => Some(v[0] as f64),
            AttrValue::Floats(v) if v.len() == 1 => Some(v[0]),
            AttrValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String value of a text attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(v) => write!(f, "{}", v),
            AttrValue::Texts(v) => write!(f, "{}", v.join(", ")),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Ints(v) => write!(f, "{:?}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Floats(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

/// A named N-dimensional array with labeled dimensions.
#[derive(Debug, Clone)]
pub struct DataArray {
    /// Variable name.
    pub name: String,
    /// Dimension names, one per axis.
    pub dims: Vec<String>,
    /// Values, decoded to f64.
    pub data: ArrayD<f64>,
    /// Variable attributes.
    pub attrs: IndexMap<String, AttrValue>,
    /// Attributes consumed while decoding (`scale_factor`, `_FillValue`, ...).
    pub encoding: IndexMap<String, AttrValue>,
    /// Storage type in the source container.
    pub dtype: String,
}

impl DataArray {
    /// Create an array; `dims` must name every axis of `data`.
    pub fn new(name: impl Into<String>, dims: Vec<String>, data: ArrayD<f64>) -> Result<Self> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(Atl11Error::malformed(format!(
                "variable {} has {} dimension names for {} axes",
                name,
                dims.len(),
                data.ndim()
            )));
        }
        Ok(Self {
            name,
            dims,
            data,
            attrs: IndexMap::new(),
            encoding: IndexMap::new(),
            dtype: "float64".to_string(),
        })
    }

    /// Build a 1-D array along `dim`.
    pub fn from_vec(name: impl Into<String>, dim: impl Into<String>, values: Vec<f64>) -> Self {
        let data = Array1::from_vec(values).into_dyn();
        Self {
            name: name.into(),
            dims: vec![dim.into()],
            data,
            attrs: IndexMap::new(),
            encoding: IndexMap::new(),
            dtype: "float64".to_string(),
        }
    }

    /// Attach an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Shape of the data.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Values in logical (row-major) order.
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Same name, dimensions, shape, type and attributes.
    pub fn structurally_eq(&self, other: &DataArray) -> bool {
        self.name == other.name
            && self.dims == other.dims
            && self.shape() == other.shape()
            && self.dtype == other.dtype
            && self.attrs == other.attrs
    }

    fn summary(&self) -> String {
        format!("({}) {}", self.dims.join(", "), self.dtype)
    }
}

/// A collection of labeled arrays sharing dimensions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Group name, `/` for the container root.
    pub name: String,
    /// Dimension lengths in first-seen order.
    pub dims: IndexMap<String, usize>,
    /// Coordinate variables.
    pub coords: IndexMap<String, DataArray>,
    /// Data variables.
    pub data_vars: IndexMap<String, DataArray>,
    /// Dataset attributes.
    pub attrs: IndexMap<String, AttrValue>,
    /// Nested groups, keyed by their own name.
    pub children: IndexMap<String, Dataset>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare a dimension. Conflicting lengths are rejected.
    pub fn add_dim(&mut self, name: impl Into<String>, len: usize) -> Result<()> {
        let name = name.into();
        match self.dims.get(&name) {
            Some(&existing) if existing != len => Err(Atl11Error::malformed(format!(
                "dimension {} has conflicting lengths {} and {} in {}",
                name, existing, len, self.name
            ))),
            Some(_) => Ok(()),
            None => {
                self.dims.insert(name, len);
                Ok(())
            }
        }
    }

    fn register_dims(&mut self, array: &DataArray) -> Result<()> {
        for (dim, &len) in array.dims.iter().zip(array.shape()) {
            self.add_dim(dim.clone(), len)?;
        }
        Ok(())
    }

    /// Add a coordinate variable.
    pub fn add_coord(&mut self, array: DataArray) -> Result<()> {
        self.register_dims(&array)?;
        self.coords.insert(array.name.clone(), array);
        Ok(())
    }

    /// Add a data variable.
    pub fn add_data_var(&mut self, array: DataArray) -> Result<()> {
        self.register_dims(&array)?;
        self.data_vars.insert(array.name.clone(), array);
        Ok(())
    }

    /// Attach a nested group.
    pub fn add_child(&mut self, name: impl Into<String>, child: Dataset) {
        self.children.insert(name.into(), child);
    }

    /// Nested group at a `/`-separated path below this one.
    pub fn child(&self, path: &str) -> Option<&Dataset> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |dataset, segment| dataset.children.get(segment))
    }

    /// Look up a coordinate or data variable by name.
    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.coords.get(name).or_else(|| self.data_vars.get(name))
    }

    /// Length of a dimension.
    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.dims.get(name).copied()
    }

    /// Names of all variables, coordinates first.
    pub fn variable_names(&self) -> Vec<&str> {
        self.coords
            .keys()
            .chain(self.data_vars.keys())
            .map(String::as_str)
            .collect()
    }

    /// Same dimensions, attributes and variable structure, recursively.
    pub fn structurally_eq(&self, other: &Dataset) -> bool {
        fn same(a: &IndexMap<String, DataArray>, b: &IndexMap<String, DataArray>) -> bool {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && va.structurally_eq(vb))
        }

        self.name == other.name
            && self.dims == other.dims
            && self.attrs == other.attrs
            && same(&self.coords, &other.coords)
            && same(&self.data_vars, &other.data_vars)
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.structurally_eq(b))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Dataset> {}", self.name)?;

        let dims: Vec<String> = self
            .dims
            .iter()
            .map(|(name, len)| format!("{}: {}", name, len))
            .collect();
        writeln!(f, "Dimensions:  ({})", dims.join(", "))?;

        let width = self
            .variable_names()
            .iter()
            .map(|name| name.len())
            .max()
            .unwrap_or(0);

        if !self.coords.is_empty() {
            writeln!(f, "Coordinates:")?;
            for (name, array) in &self.coords {
                writeln!(f, "    {:width$}  {}", name, array.summary(), width = width)?;
            }
        }

        if self.data_vars.is_empty() {
            writeln!(f, "Data variables:\n    *empty*")?;
        } else {
            writeln!(f, "Data variables:")?;
            for (name, array) in &self.data_vars {
                writeln!(f, "    {:width$}  {}", name, array.summary(), width = width)?;
            }
        }

        if !self.children.is_empty() {
            writeln!(f, "Groups: ({})", self.children.len())?;
            for (name, child) in &self.children {
                let dims: Vec<String> = child
                    .dims
                    .iter()
                    .map(|(d, len)| format!("{}={}", d, len))
                    .collect();
                writeln!(f, "    {} ({})", name, dims.join(", "))?;
            }
        }

        if !self.attrs.is_empty() {
            writeln!(f, "Attributes: ({})", self.attrs.len())?;
            for (key, value) in &self.attrs {
                let text = value.to_string();
                let text = if text.chars().count() > 60 {
                    format!("{}...", text.chars().take(57).collect::<String>())
                } else {
                    text
                };
                writeln!(f, "    {}: {}", key, text)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn data_array_requires_one_name_per_axis() {
        let data = ArrayD::zeros(IxDyn(&[2, 3]));
        assert!(DataArray::new("h_corr", vec!["ref_pt".into()], data.clone()).is_err());
        let array =
            DataArray::new("h_corr", vec!["ref_pt".into(), "cycle_number".into()], data).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array.len(), 6);
    }

    #[test]
    fn dataset_tracks_dimension_lengths() {
        let mut ds = Dataset::new("pt1");
        ds.add_coord(DataArray::from_vec("ref_pt", "ref_pt", vec![1.0, 2.0, 3.0]))
            .unwrap();
        ds.add_data_var(DataArray::from_vec("latitude", "ref_pt", vec![-70.0; 3]))
            .unwrap();
        assert_eq!(ds.dim_len("ref_pt"), Some(3));
        assert_eq!(ds.variable_names(), vec!["ref_pt", "latitude"]);

        let err = ds
            .add_data_var(DataArray::from_vec("longitude", "ref_pt", vec![0.0; 4]))
            .unwrap_err();
        assert!(matches!(err, Atl11Error::MalformedContainer(_)));
    }

    #[test]
    fn display_lists_coordinates_and_variables() {
        let mut ds = Dataset::new("pt2");
        ds.add_coord(DataArray::from_vec("ref_pt", "ref_pt", vec![1.0, 2.0]))
            .unwrap();
        ds.add_data_var(DataArray::from_vec("h_corr", "ref_pt", vec![10.0, 11.0]))
            .unwrap();
        ds.attrs.insert("description".into(), "pair track 2".into());

        let text = ds.to_string();
        assert!(text.contains("<Dataset> pt2"));
        assert!(text.contains("Dimensions:  (ref_pt: 2)"));
        assert!(text.contains("h_corr"));
        assert!(text.contains("description: pair track 2"));
    }

    #[test]
    fn empty_dataset_says_so() {
        let text = Dataset::new("/").to_string();
        assert!(text.contains("*empty*"));
    }

    #[test]
    fn nested_groups_resolve_by_path() {
        let mut ref_surf = Dataset::new("pt1/ref_surf");
        ref_surf
            .add_data_var(DataArray::from_vec("n_slope", "ref_pt", vec![0.1, 0.2]))
            .unwrap();
        let mut pt1 = Dataset::new("pt1");
        pt1.add_child("ref_surf", ref_surf);

        assert_eq!(pt1.child("ref_surf").unwrap().name, "pt1/ref_surf");
        assert!(pt1.child("ref_surf/").is_some());
        assert!(pt1.child("cycle_stats").is_none());
        assert!(pt1.child("ref_surf/deeper").is_none());

        let text = pt1.to_string();
        assert!(text.contains("Groups: (1)"));
        assert!(text.contains("ref_surf (ref_pt=2)"));
    }

    #[test]
    fn structural_equality_covers_children() {
        let mut a = Dataset::new("pt1");
        a.add_child("ref_surf", Dataset::new("pt1/ref_surf"));
        let b = Dataset::new("pt1");
        assert!(!a.structurally_eq(&b));
        assert!(a.structurally_eq(&a.clone()));
    }

    #[test]
    fn built_arrays_report_float64() {
        assert_eq!(DataArray::from_vec("x", "ref_pt", vec![1.0]).dtype, "float64");
        let data = ArrayD::zeros(IxDyn(&[1]));
        assert_eq!(DataArray::new("x", vec!["ref_pt".into()], data).unwrap().dtype, "float64");
    }

    #[test]
    fn attr_value_numeric_views() {
        assert_eq!(AttrValue::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(AttrValue::Ints(vec![3]).as_f64(), Some(3.0));
        assert_eq!(AttrValue::Ints(vec![3, 4]).as_f64(), None);
        assert_eq!(AttrValue::Text("latitude longitude".into()).as_f64(), None);
    }
}
