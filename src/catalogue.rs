//! Multi-scale stellar association catalogues and their id masks.
//!
//! Files are found by directory convention:
//!
//! ```text
//! <root>/associations <version>/multi-scale stellar associations/<target>/
//!     <target>_<band>_tracerstars/<scale>pc/
//!         <target>_phangshst_associations_<band>_ws<scale>pc_<version>.fits
//!         <target>_phangshst_associations_<band>_ws<scale>pc_idmask_<version>.fits
//! ```

use crate::coords::{SkyCoord, SkyPolygon};
use crate::error::{Error, Result};
use crate::fits::{self, Table};
use crate::image::LabelMask;
use crate::wcs::Wcs;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 1 mJy in erg s^-1 cm^-2 Hz^-1.
pub const MJY_IN_CGS: f64 = 1e-26;

/// Factor applied to every `*_mjy` column to obtain `*_FLUX`.
pub const FLUX_SCALE: f64 = 1e20 * MJY_IN_CGS;

/// Source column → canonical column.
pub const COLUMN_RENAMES: [(&str, &str); 11] = [
    ("reg_id", "assoc_ID"),
    ("reg_ra", "RA"),
    ("reg_dec", "DEC"),
    ("reg_x", "X"),
    ("reg_y", "Y"),
    ("reg_dolflux_Age_MinChiSq", "age"),
    ("reg_dolflux_Mass_MinChiSq", "mass"),
    ("reg_dolflux_Ebv_MinChiSq", "EBV"),
    ("reg_dolflux_Age_MinChiSq_err", "age_err"),
    ("reg_dolflux_Mass_MinChiSq_err", "mass_err"),
    ("reg_dolflux_Ebv_MinChiSq_err", "EBV_err"),
];

/// A flux column is derived from every column ending in `suffix`, named
/// `<prefix before the first underscore><derived>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluxRule {
    pub suffix: &'static str,
    pub derived: &'static str,
}

pub const FLUX_RULES: [FluxRule; 2] = [
    FluxRule {
        suffix: "mjy",
        derived: "_FLUX",
    },
    FluxRule {
        suffix: "mjy_err",
        derived: "_FLUX_ERR",
    },
];

/// Canonical name of a source column.
pub fn canonical_name(column: &str) -> &str {
    COLUMN_RENAMES
        .iter()
        .find(|(from, _)| *from == column)
        .map_or(column, |(_, to)| to)
}

/// Name of the flux column derived from `column`, if any.
pub fn derived_flux_column(column: &str) -> Option<String> {
    FLUX_RULES
        .iter()
        .find(|rule| column.ends_with(rule.suffix))
        .map(|rule| {
            let prefix = column.split('_').next().unwrap_or(column);
            format!("{prefix}{}", rule.derived)
        })
}

/// Which products [`read_associations`] loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DataSelector {
    #[default]
    All,
    Catalogue,
    Mask,
}

impl DataSelector {
    fn wants_catalogue(self) -> bool {
        matches!(self, DataSelector::All | DataSelector::Catalogue)
    }

    fn wants_mask(self) -> bool {
        matches!(self, DataSelector::All | DataSelector::Mask)
    }
}

impl FromStr for DataSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(DataSelector::All),
            "catalogue" => Ok(DataSelector::Catalogue),
            "mask" => Ok(DataSelector::Mask),
            other => Err(format!("unknown data selector '{other}' (all, catalogue, mask)")),
        }
    }
}

/// One row of the association catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRecord {
    pub assoc_id: i64,
    pub position: SkyCoord,
    pub x: f64,
    pub y: f64,
    pub age: f64,
    pub mass: f64,
    pub ebv: f64,
    pub age_err: f64,
    pub mass_err: f64,
    pub ebv_err: f64,
    /// All further numeric columns, including the derived fluxes.
    pub extra: BTreeMap<String, f64>,
}

impl AssociationRecord {
    /// `<band>_FLUX`, e.g. `flux("F275W")`.
    pub fn flux(&self, band: &str) -> Option<f64> {
        self.extra.get(&format!("{band}_FLUX")).copied()
    }

    pub fn flux_err(&self, band: &str) -> Option<f64> {
        self.extra.get(&format!("{band}_FLUX_ERR")).copied()
    }

    fn value(&self, column: &str) -> Option<f64> {
        Some(match column {
            "assoc_ID" => self.assoc_id as f64,
            "RA" => self.position.ra,
            "DEC" => self.position.dec,
            "X" => self.x,
            "Y" => self.y,
            "age" => self.age,
            "mass" => self.mass,
            "EBV" => self.ebv,
            "age_err" => self.age_err,
            "mass_err" => self.mass_err,
            "EBV_err" => self.ebv_err,
            other => return self.extra.get(other).copied(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationCatalogue {
    pub file: PathBuf,
    columns: Vec<String>,
    pub records: Vec<AssociationRecord>,
}

impl AssociationCatalogue {
    /// Validate and convert a raw table: every source column of
    /// [`COLUMN_RENAMES`] must be present.
    pub fn from_table(table: &Table, file: &Path) -> Result<Self> {
        let missing: Vec<String> = COLUMN_RENAMES
            .iter()
            .filter(|(from, _)| table.column(from).is_none())
            .map(|(from, _)| from.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::SchemaMismatch {
                file: file.to_path_buf(),
                missing,
            });
        }

        let mut columns: Vec<String> = table.names().map(|n| canonical_name(n).to_string()).collect();
        let derived: Vec<(String, &[f64])> = table
            .columns()
            .iter()
            .filter_map(|(name, values)| derived_flux_column(name).map(|d| (d, values.as_slice())))
            .collect();
        for (name, _) in &derived {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }

        let col = |name: &str| table.column(name).unwrap_or(&[]);
        let records = (0..table.num_rows())
            .map(|i| {
                let mut extra = BTreeMap::new();
                for (name, values) in table.columns() {
                    if canonical_name(name) == name {
                        extra.insert(name.clone(), values[i]);
                    }
                }
                for (name, values) in &derived {
                    extra.insert(name.clone(), FLUX_SCALE * values[i]);
                }
                AssociationRecord {
                    assoc_id: col("reg_id")[i].round() as i64,
                    position: SkyCoord::new(col("reg_ra")[i], col("reg_dec")[i]),
                    x: col("reg_x")[i],
                    y: col("reg_y")[i],
                    age: col("reg_dolflux_Age_MinChiSq")[i],
                    mass: col("reg_dolflux_Mass_MinChiSq")[i],
                    ebv: col("reg_dolflux_Ebv_MinChiSq")[i],
                    age_err: col("reg_dolflux_Age_MinChiSq_err")[i],
                    mass_err: col("reg_dolflux_Mass_MinChiSq_err")[i],
                    ebv_err: col("reg_dolflux_Ebv_MinChiSq_err")[i],
                    extra,
                }
            })
            .collect();

        Ok(Self {
            file: file.to_path_buf(),
            columns,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names after renaming, derived flux columns last.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if !self.has_column(name) {
            return None;
        }
        self.records.iter().map(|r| r.value(name)).collect()
    }

    pub fn positions(&self) -> Vec<SkyCoord> {
        self.records.iter().map(|r| r.position).collect()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.assoc_id).collect()
    }
}

/// What [`read_associations`] returns for each [`DataSelector`].
#[derive(Debug, Clone)]
pub enum Associations {
    Catalogue(AssociationCatalogue),
    Mask(LabelMask),
    All(AssociationCatalogue, LabelMask),
}

impl Associations {
    pub fn catalogue(&self) -> Option<&AssociationCatalogue> {
        match self {
            Associations::Catalogue(c) | Associations::All(c, _) => Some(c),
            Associations::Mask(_) => None,
        }
    }

    pub fn mask(&self) -> Option<&LabelMask> {
        match self {
            Associations::Mask(m) | Associations::All(_, m) => Some(m),
            Associations::Catalogue(_) => None,
        }
    }

    pub fn into_parts(self) -> (Option<AssociationCatalogue>, Option<LabelMask>) {
        match self {
            Associations::Catalogue(c) => (Some(c), None),
            Associations::Mask(m) => (None, Some(m)),
            Associations::All(c, m) => (Some(c), Some(m)),
        }
    }
}

impl fmt::Display for Associations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = self.catalogue() {
            writeln!(f, "catalogue: {} ({} rows)", c.file.display(), c.len())?;
            writeln!(f, "columns: {}", c.columns().join(", "))?;
        }
        if let Some(m) = self.mask() {
            let (rows, cols) = m.shape();
            writeln!(f, "mask: {cols}x{rows} pixels, {} labels", crate::reproject::unique_labels(&m.data).len())?;
            let corners: Vec<String> = SkyPolygon::footprint(m)
                .vertices
                .iter()
                .map(|v| v.to_hmsdms(1))
                .collect();
            writeln!(f, "footprint: {}", corners.join(" | "))?;
        }
        Ok(())
    }
}

/// Directory holding the multi-scale association products of `version`.
pub fn associations_root(folder: &Path, version: &str) -> PathBuf {
    folder
        .join(format!("associations {version}"))
        .join("multi-scale stellar associations")
}

pub fn catalogue_file_name(target: &str, band: &str, scale_pc: u32, version: &str) -> String {
    format!("{target}_phangshst_associations_{band}_ws{scale_pc}pc_{version}.fits")
}

pub fn mask_file_name(target: &str, band: &str, scale_pc: u32, version: &str) -> String {
    format!("{target}_phangshst_associations_{band}_ws{scale_pc}pc_idmask_{version}.fits")
}

fn entry_stems(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut stems: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .collect();
    stems.sort();
    stems
}

/// Resolve `<target>/<target>_<band>_tracerstars/<scale>pc`, writing the
/// valid alternatives to `out` when a level is missing.
pub fn resolve_scale_dir(
    base: &Path,
    target: &str,
    band: &str,
    scale_pc: u32,
    out: &mut impl Write,
) -> Result<PathBuf> {
    if !base.join(target).is_dir() {
        let available = entry_stems(base);
        writeln!(out, "target not available. Use\n{}", available.join(","))?;
        log::warn!("target {target} not found in {}", base.display());
        return Err(Error::TargetNotFound {
            target: target.to_string(),
            available,
        });
    }

    let target_dir = base.join(target).join(format!("{target}_{band}_tracerstars"));
    let scale_dir = target_dir.join(format!("{scale_pc}pc"));
    if !scale_dir.is_dir() {
        let mut available: Vec<u32> = entry_stems(&target_dir)
            .iter()
            .filter_map(|s| s.strip_suffix("pc"))
            .filter_map(|s| s.parse().ok())
            .collect();
        available.sort_unstable();
        writeln!(out, "scalepc={scale_pc} not available. Use:")?;
        writeln!(out, "{available:?}")?;
        log::warn!("scale {scale_pc}pc not found in {}", target_dir.display());
        return Err(Error::ScaleNotFound {
            target: target.to_string(),
            scale_pc,
            available,
        });
    }
    Ok(scale_dir)
}

/// Load the association catalogue and/or id mask of one target at one
/// spatial scale.
///
/// The catalogue comes from binary table HDU 1 with its columns renamed to
/// the canonical schema and a `<band>_FLUX(_ERR)` column derived from every
/// `*_mjy(_err)` column. The mask comes from the primary HDU with zero
/// pixels replaced by NaN.
///
/// Unknown targets and scales print the available choices to stdout.
pub fn read_associations(
    folder: &Path,
    target: &str,
    scale_pc: u32,
    band: &str,
    version: &str,
    data: DataSelector,
) -> Result<Associations> {
    let stdout = std::io::stdout();
    read_associations_with(folder, target, scale_pc, band, version, data, &mut stdout.lock())
}

/// [`read_associations`] with the target/scale listing written to `out`.
pub fn read_associations_with<W: Write>(
    folder: &Path,
    target: &str,
    scale_pc: u32,
    band: &str,
    version: &str,
    data: DataSelector,
    out: &mut W,
) -> Result<Associations> {
    let base = associations_root(folder, version);
    let dir = resolve_scale_dir(&base, target, band, scale_pc, out)?;

    let catalogue = if data.wants_catalogue() {
        let file = dir.join(catalogue_file_name(target, band, scale_pc, version));
        let table = fits::read_table(&file, 1)?;
        let catalogue = AssociationCatalogue::from_table(&table, &file)?;
        log::info!("read {} associations from {}", catalogue.len(), file.display());
        Some(catalogue)
    } else {
        None
    };

    let mask = if data.wants_mask() {
        let file = dir.join(mask_file_name(target, band, scale_pc, version));
        let (pixels, header) = fits::read_image_f64(&file, 0)?;
        let wcs = Wcs::from_header(&header)?;
        log::info!("read id mask from {}", file.display());
        Some(LabelMask::from_label_image(pixels, header, wcs))
    } else {
        None
    };

    match (catalogue, mask) {
        (Some(c), Some(m)) => Ok(Associations::All(c, m)),
        (Some(c), None) => Ok(Associations::Catalogue(c)),
        (None, Some(m)) => Ok(Associations::Mask(m)),
        (None, None) => Err(Error::Shape("nothing selected".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn renames_are_canonical() {
        assert_eq!(canonical_name("reg_id"), "assoc_ID");
        assert_eq!(canonical_name("reg_dolflux_Ebv_MinChiSq_err"), "EBV_err");
        assert_eq!(canonical_name("F275W_mjy"), "F275W_mjy");
        let targets: Vec<&str> = COLUMN_RENAMES.iter().map(|(_, to)| *to).collect();
        assert_eq!(
            targets,
            ["assoc_ID", "RA", "DEC", "X", "Y", "age", "mass", "EBV", "age_err", "mass_err", "EBV_err"]
        );
    }

    #[test]
    fn flux_columns_are_derived_from_mjy() {
        assert_eq!(derived_flux_column("NUV_mjy").as_deref(), Some("NUV_FLUX"));
        assert_eq!(derived_flux_column("NUV_mjy_err").as_deref(), Some("NUV_FLUX_ERR"));
        assert_eq!(derived_flux_column("F275W_dolflux_mjy").as_deref(), Some("F275W_FLUX"));
        assert_eq!(derived_flux_column("reg_x"), None);
        assert_relative_eq!(FLUX_SCALE, 1e-6);
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("mask".parse::<DataSelector>(), Ok(DataSelector::Mask));
        assert_eq!(DataSelector::default(), DataSelector::All);
        assert!("both".parse::<DataSelector>().is_err());
    }

    fn table(names: &[&str]) -> Table {
        Table::new(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.to_string(), vec![i as f64, 10.0 + i as f64]))
                .collect(),
        )
    }

    #[test]
    fn typed_records() {
        let mut names: Vec<&str> = COLUMN_RENAMES.iter().map(|(from, _)| *from).collect();
        names.extend(["NUV_mjy", "NUV_mjy_err"]);
        let cat = AssociationCatalogue::from_table(&table(&names), Path::new("cat.fits")).unwrap();
        assert_eq!(cat.len(), 2);
        assert!(cat.has_column("assoc_ID"));
        assert!(!cat.has_column("reg_id"));
        assert!(cat.has_column("NUV_mjy"));
        assert_eq!(&cat.columns()[cat.columns().len() - 2..], ["NUV_FLUX", "NUV_FLUX_ERR"]);

        let rec = &cat.records[1];
        assert_eq!(rec.assoc_id, 10);
        assert_eq!(rec.position, SkyCoord::new(11.0, 12.0));
        assert_relative_eq!(rec.flux("NUV").unwrap(), 21.0 * FLUX_SCALE);
        assert_relative_eq!(rec.flux_err("NUV").unwrap(), 22.0 * FLUX_SCALE);
        assert_eq!(cat.column("EBV"), Some(vec![7.0, 17.0]));
        assert_eq!(cat.column("nope"), None);
    }

    #[test]
    fn missing_columns_fail_fast() {
        let err = AssociationCatalogue::from_table(&table(&["reg_id", "reg_ra"]), Path::new("cat.fits"))
            .unwrap_err();
        match err {
            Error::SchemaMismatch { missing, .. } => {
                assert_eq!(missing.len(), 9);
                assert!(missing.contains(&"reg_dec".to_string()));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn file_names() {
        assert_eq!(
            catalogue_file_name("NGC628", "nuv", 32, "v1p1"),
            "NGC628_phangshst_associations_nuv_ws32pc_v1p1.fits"
        );
        assert_eq!(
            mask_file_name("NGC628", "nuv", 32, "v1p1"),
            "NGC628_phangshst_associations_nuv_ws32pc_idmask_v1p1.fits"
        );
    }
}
