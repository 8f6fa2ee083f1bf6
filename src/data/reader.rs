//! Container reader.
//!
//! Opens HDF5 / netCDF-4 containers through the `netcdf` crate and turns the
//! root or a single group into a [`Dataset`].

use super::{AttrValue, DataArray, Dataset};
use crate::error::{Atl11Error, Result};
use indexmap::{IndexMap, IndexSet};
use ndarray::{ArrayD, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Attributes that describe how values are stored rather than what they mean.
const ENCODING_ATTRS: [&str; 4] = ["_FillValue", "missing_value", "scale_factor", "add_offset"];

/// Prefix netCDF-C gives to HDF5 dimensions that carry no dimension scale.
const PHONY_DIM_PREFIX: &str = "phony_dim_";

/// Something that can hand out datasets for its groups.
pub trait GroupSource {
    /// Load the root (`None`) or the named group as a dataset.
    fn open_group(&self, group: Option<&str>) -> Result<Dataset>;

    /// Names of the top-level groups, in container order.
    fn group_names(&self) -> Result<Vec<String>>;
}

/// Treatment of unlabeled (phony) dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhonyDims {
    /// Accept them under their generated `phony_dim_N` names.
    #[default]
    Access,
    /// Refuse variables that mix labeled and unlabeled dimensions.
    Reject,
}

/// An open container file.
pub struct ContainerReader {
    path: PathBuf,
    file: netcdf::File,
    phony_dims: PhonyDims,
}

impl fmt::Debug for ContainerReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerReader")
            .field("path", &self.path)
            .field("phony_dims", &self.phony_dims)
            .finish()
    }
}

impl ContainerReader {
    /// Open a container. Anything the library cannot parse is malformed.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Atl11Error::path_not_found(path.display().to_string()));
        }
        let file = netcdf::open(path).map_err(|e| {
            Atl11Error::malformed(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            phony_dims: PhonyDims::default(),
        })
    }

    /// Set the phony dimension policy.
    pub fn with_phony_dims(mut self, phony_dims: PhonyDims) -> Self {
        self.phony_dims = phony_dims;
        self
    }

    /// Path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Top-level group names in container order.
    pub fn group_names(&self) -> Result<Vec<String>> {
        Ok(self
            .file
            .groups()?
            .map(|group| group.name().to_string())
            .collect())
    }

    /// Read the root (`None`) or the group at a `/`-separated path, together
    /// with every group nested below it.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_dataset(&self, group: Option<&str>) -> Result<Dataset> {
        let segments: Vec<&str> = group
            .unwrap_or_default()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let Some((first, rest)) = segments.split_first() else {
            return self.read_root();
        };
        let path = segments.join("/");
        let top = self
            .file
            .groups()?
            .find(|g| g.name() == *first)
            .ok_or_else(|| Atl11Error::group_not_found(&path))?;
        self.descend(&top, rest, &path)
    }

    fn read_root(&self) -> Result<Dataset> {
        let dims = self
            .file
            .dimensions()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();
        let variables: Vec<_> = self.file.variables().collect();
        let attributes: Vec<_> = self.file.attributes().collect();
        let mut root = self.build_dataset("/", dims, &variables, &attributes)?;
        for child in self.file.groups()? {
            let name = child.name().to_string();
            root.add_child(name.clone(), self.read_group(&child, &name)?);
        }
        Ok(root)
    }

    /// Walk down `rest` one segment at a time; a missing segment means the
    /// whole path is absent.
    fn descend(&self, group: &netcdf::Group<'_>, rest: &[&str], path: &str) -> Result<Dataset> {
        match rest.split_first() {
            None => self.read_group(group, path),
            Some((next, tail)) => {
                let child = group
                    .groups()
                    .find(|g| g.name() == *next)
                    .ok_or_else(|| Atl11Error::group_not_found(path))?;
                self.descend(&child, tail, path)
            }
        }
    }

    fn read_group(&self, group: &netcdf::Group<'_>, path: &str) -> Result<Dataset> {
        let dims = group
            .dimensions()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();
        let variables: Vec<_> = group.variables().collect();
        let attributes: Vec<_> = group.attributes().collect();
        let mut dataset = self.build_dataset(path, dims, &variables, &attributes)?;

        for child in group.groups() {
            let name = child.name().to_string();
            let child_path = format!("{}/{}", path, name);
            dataset.add_child(name, self.read_group(&child, &child_path)?);
        }
        Ok(dataset)
    }

    fn build_dataset(
        &self,
        name: &str,
        dims: Vec<(String, usize)>,
        variables: &[netcdf::Variable<'_>],
        attributes: &[netcdf::Attribute<'_>],
    ) -> Result<Dataset> {
        let mut dataset = Dataset::new(name);

        for attr in attributes {
            dataset
                .attrs
                .insert(attr.name().to_string(), attr_value(attr)?);
        }

        for (dim, len) in dims {
            dataset.add_dim(dim, len)?;
        }

        // Variables named by a `coordinates` attribute are coordinates too.
        let mut coordinate_names = IndexSet::new();
        for var in variables {
            if let Some(attr) = var.attribute("coordinates") {
                if let AttrValue::Text(list) = attr_value(&attr)? {
                    coordinate_names.extend(list.split_whitespace().map(str::to_string));
                }
            }
        }

        for var in variables {
            let Some(array) = self.read_array(var)? else {
                continue;
            };
            let is_coordinate =
                array.dims.contains(&array.name) || coordinate_names.contains(&array.name);
            if is_coordinate {
                dataset.add_coord(array)?;
            } else {
                dataset.add_data_var(array)?;
            }
        }

        debug!(
            group = name,
            coords = dataset.coords.len(),
            data_vars = dataset.data_vars.len(),
            "Read dataset"
        );
        Ok(dataset)
    }

    fn read_array(&self, var: &netcdf::Variable<'_>) -> Result<Option<DataArray>> {
        let name = var.name().to_string();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();

        self.check_phony_dims(&name, &dims)?;

        let Some(raw) = read_variable_array(var, &shape)? else {
            debug!(variable = %name, vartype = ?var.vartype(), "Skipping non-numeric variable");
            return Ok(None);
        };

        let mut attrs = IndexMap::new();
        let mut encoding = IndexMap::new();
        for attr in var.attributes() {
            let key = attr.name().to_string();
            let value = attr_value(&attr)?;
            if ENCODING_ATTRS.contains(&key.as_str()) {
                encoding.insert(key, value);
            } else {
                attrs.insert(key, value);
            }
        }

        let data = decode(raw, &encoding);
        let mut array = DataArray::new(name, dims, data)?;
        array.attrs = attrs;
        array.encoding = encoding;
        array.dtype = vartype_name(&var.vartype());
        Ok(Some(array))
    }

    fn check_phony_dims(&self, name: &str, dims: &[String]) -> Result<()> {
        let phony = dims
            .iter()
            .filter(|d| d.starts_with(PHONY_DIM_PREFIX))
            .count();
        if phony == 0 || phony == dims.len() {
            return Ok(());
        }
        match self.phony_dims {
            PhonyDims::Access => {
                warn!(variable = name, ?dims, "Variable mixes labeled and unlabeled dimensions");
                Ok(())
            }
            PhonyDims::Reject => Err(Atl11Error::malformed(format!(
                "variable {} has mixing of labeled and unlabeled dimensions: {}",
                name,
                dims.join(", ")
            ))),
        }
    }
}

/// Apply fill values and CF packing to raw values.
fn decode(mut data: ArrayD<f64>, encoding: &IndexMap<String, AttrValue>) -> ArrayD<f64> {
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|key| encoding.get(*key))
        .filter_map(AttrValue::as_f64)
        .collect();
    if !fills.is_empty() {
        data.mapv_inplace(|v| if fills.contains(&v) { f64::NAN } else { v });
    }

    let scale_factor = encoding
        .get("scale_factor")
        .and_then(AttrValue::as_f64)
        .unwrap_or(1.0);
    let add_offset = encoding
        .get("add_offset")
        .and_then(AttrValue::as_f64)
        .unwrap_or(0.0);
    if scale_factor != 1.0 || add_offset != 0.0 {
        data.mapv_inplace(|v| v * scale_factor + add_offset);
    }

    data
}

fn vartype_name(vartype: &NcVariableType) -> String {
    match vartype {
        NcVariableType::Float(FloatType::F64) => "float64",
        NcVariableType::Float(FloatType::F32) => "float32",
        NcVariableType::Int(IntType::I64) => "int64",
        NcVariableType::Int(IntType::I32) => "int32",
        NcVariableType::Int(IntType::I16) => "int16",
        NcVariableType::Int(IntType::I8) => "int8",
        NcVariableType::Int(IntType::U64) => "uint64",
        NcVariableType::Int(IntType::U32) => "uint32",
        NcVariableType::Int(IntType::U16) => "uint16",
        NcVariableType::Int(IntType::U8) => "uint8",
        NcVariableType::Char => "char",
        NcVariableType::String => "string",
        _ => "other",
    }
    .to_string()
}

/// Read a numeric variable into f64, `None` for types that have no numeric view.
fn read_variable_array(
    var: &netcdf::Variable<'_>,
    shape: &[usize],
) -> Result<Option<ArrayD<f64>>> {
    let from_vec = |v: Vec<f64>| -> Result<Option<ArrayD<f64>>> {
        ArrayD::from_shape_vec(IxDyn(shape), v)
            .map(Some)
            .map_err(|e| Atl11Error::malformed(format!("invalid shape/data size: {}", e)))
    };

    macro_rules! read_as {
        ($t:ty) => {{
            let values: Vec<$t> = var.get_values(..)?;
            from_vec(values.into_iter().map(|x| x as f64).collect())
        }};
    }

    match var.vartype() {
        NcVariableType::Float(FloatType::F64) => {
            let values: Vec<f64> = var.get_values(..)?;
            from_vec(values)
        }
        NcVariableType::Float(FloatType::F32) => read_as!(f32),
        NcVariableType::Int(IntType::I64) => read_as!(i64),
        NcVariableType::Int(IntType::I32) => read_as!(i32),
        NcVariableType::Int(IntType::I16) => read_as!(i16),
        NcVariableType::Int(IntType::I8) => read_as!(i8),
        NcVariableType::Int(IntType::U64) => read_as!(u64),
        NcVariableType::Int(IntType::U32) => read_as!(u32),
        NcVariableType::Int(IntType::U16) => read_as!(u16),
        NcVariableType::Int(IntType::U8) => read_as!(u8),
        _ => Ok(None),
    }
}

fn attr_value(attr: &netcdf::Attribute<'_>) -> Result<AttrValue> {
    use netcdf::AttributeValue;

    let value = match attr.value()? {
        AttributeValue::Uchar(v) => AttrValue::Int(v as i64),
        AttributeValue::Schar(v) => AttrValue::Int(v as i64),
        AttributeValue::Ushort(v) => AttrValue::Int(v as i64),
        AttributeValue::Short(v) => AttrValue::Int(v as i64),
        AttributeValue::Uint(v) => AttrValue::Int(v as i64),
        AttributeValue::Int(v) => AttrValue::Int(v as i64),
        AttributeValue::Ulonglong(v) => AttrValue::Int(v as i64),
        AttributeValue::Longlong(v) => AttrValue::Int(v),
        AttributeValue::Float(v) => AttrValue::Float(v as f64),
        AttributeValue::Double(v) => AttrValue::Float(v),
        AttributeValue::Str(v) => AttrValue::Text(v),
        AttributeValue::Uchars(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Schars(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Ushorts(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Shorts(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Uints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Ints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Ulonglongs(v) => AttrValue::Ints(v.into_iter().map(|x| x as i64).collect()),
        AttributeValue::Longlongs(v) => AttrValue::Ints(v),
        AttributeValue::Floats(v) => AttrValue::Floats(v.into_iter().map(f64::from).collect()),
        AttributeValue::Doubles(v) => AttrValue::Floats(v),
        AttributeValue::Strs(v) => AttrValue::Texts(v),
    };
    Ok(value)
}
