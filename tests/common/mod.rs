//! Fixture containers written with the netcdf crate.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory holding fixture files.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// One group per entry, each with a `ref_pt` coordinate and an `elevation`
/// variable holding the given values.
pub fn write_elevation_groups(path: &Path, groups: &[(&str, Vec<f64>)]) {
    let mut file = netcdf::create(path).expect("create fixture");
    file.add_attribute("title", "elevation fixture").unwrap();

    for (name, values) in groups {
        let mut group = file.add_group(name).unwrap();
        group
            .add_attribute("description", format!("group {}", name))
            .unwrap();
        group.add_dimension("ref_pt", values.len()).unwrap();

        let ref_pt: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        let mut coord = group.add_variable::<f64>("ref_pt", &["ref_pt"]).unwrap();
        coord.put_values(&ref_pt, ..).unwrap();

        let mut var = group
            .add_variable::<f64>("elevation", &["ref_pt"])
            .unwrap();
        var.put_attribute("units", "meters").unwrap();
        var.put_values(values, ..).unwrap();
    }
}

/// A small container laid out like an ATL11 granule: three pair tracks plus
/// an ancillary group, packed heights with a fill value, and latitude and
/// longitude declared through a `coordinates` attribute. Each pair track
/// holds a `ref_surf` group along `ref_pt` and a `cycle_stats` group along
/// `cycle_number` only.
pub fn write_atl11_like(path: &Path, ref_pts: usize) {
    let mut file = netcdf::create(path).expect("create fixture");
    file.add_attribute("short_name", "ATL11").unwrap();
    file.add_attribute("level", "L3B").unwrap();

    for (track, name) in ["pt1", "pt2", "pt3"].iter().enumerate() {
        let mut group = file.add_group(name).unwrap();
        group
            .add_attribute("description", format!("pair track {}", track + 1))
            .unwrap();
        group.add_dimension("ref_pt", ref_pts).unwrap();
        group.add_dimension("cycle_number", 2).unwrap();

        let ids: Vec<i32> = (0..ref_pts as i32).map(|i| 1000 * (track as i32 + 1) + i).collect();
        let mut ref_pt = group.add_variable::<i32>("ref_pt", &["ref_pt"]).unwrap();
        ref_pt.put_values(&ids, ..).unwrap();

        let cycles: Vec<i32> = vec![3, 4];
        let mut cycle = group
            .add_variable::<i32>("cycle_number", &["cycle_number"])
            .unwrap();
        cycle.put_values(&cycles, ..).unwrap();

        let lat: Vec<f64> = (0..ref_pts).map(|i| -70.0 - i as f64 * 0.01).collect();
        let mut latitude = group
            .add_variable::<f64>("latitude", &["ref_pt"])
            .unwrap();
        latitude.put_values(&lat, ..).unwrap();

        let lon: Vec<f64> = (0..ref_pts).map(|i| 10.0 * track as f64 + i as f64).collect();
        let mut longitude = group
            .add_variable::<f64>("longitude", &["ref_pt"])
            .unwrap();
        longitude.put_values(&lon, ..).unwrap();

        // Packed heights: stored value * 0.5 + 100; the first point is a fill.
        let mut h_corr = group
            .add_variable::<f32>("h_corr", &["ref_pt", "cycle_number"])
            .unwrap();
        h_corr.put_attribute("_FillValue", -9999.0f32).unwrap();
        h_corr.put_attribute("scale_factor", 0.5f64).unwrap();
        h_corr.put_attribute("add_offset", 100.0f64).unwrap();
        h_corr
            .put_attribute("coordinates", "latitude longitude")
            .unwrap();
        h_corr.put_attribute("units", "meters").unwrap();
        let mut packed: Vec<f32> = (0..ref_pts * 2).map(|i| i as f32).collect();
        packed[0] = -9999.0;
        h_corr.put_values(&packed, ..).unwrap();

        {
            let mut ref_surf = group.add_group("ref_surf").unwrap();
            ref_surf.add_dimension("ref_pt", ref_pts).unwrap();
            let slopes: Vec<f64> = (0..ref_pts).map(|i| (10 * track + i) as f64 / 100.0).collect();
            let mut n_slope = ref_surf
                .add_variable::<f64>("n_slope", &["ref_pt"])
                .unwrap();
            n_slope.put_values(&slopes, ..).unwrap();
        }
        {
            let mut cycle_stats = group.add_group("cycle_stats").unwrap();
            cycle_stats.add_dimension("cycle_number", 2).unwrap();
            let mut source = cycle_stats
                .add_variable::<i32>("min_signal_selection_source", &["cycle_number"])
                .unwrap();
            source.put_values(&[0i32, 1], ..).unwrap();
        }
    }

    let mut ancillary = file.add_group("ancillary_data").unwrap();
    ancillary.add_dimension("one", 1).unwrap();
    let mut epoch = ancillary
        .add_variable::<f64>("atlas_sdp_gps_epoch", &["one"])
        .unwrap();
    epoch.put_values(&[1198800018.0], ..).unwrap();
}

/// A group whose variable mixes a labeled and an unlabeled dimension.
pub fn write_mixed_dims(path: &Path) {
    let mut file = netcdf::create(path).expect("create fixture");
    let mut group = file.add_group("pt1").unwrap();
    group.add_dimension("ref_pt", 3).unwrap();
    group.add_dimension("phony_dim_0", 2).unwrap();
    let mut var = group
        .add_variable::<f64>("poly_coeffs", &["ref_pt", "phony_dim_0"])
        .unwrap();
    var.put_values(&[0.0; 6], ..).unwrap();
}
