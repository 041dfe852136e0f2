use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use clusterview::cutouts::{self, CutoutLayers};
use clusterview::{read_associations, Angle, DataSelector, LabelMask, SkyImage};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clusterview", about = "Stellar association catalogues and cutout figures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a catalogue and/or id mask and print a summary
    Catalogue {
        /// Folder containing "associations <version>"
        root: PathBuf,
        target: String,
        scale_pc: u32,
        #[arg(long, default_value = "nuv")]
        band: String,
        #[arg(long, default_value = "v1p1")]
        version: String,
        #[arg(long, value_enum, default_value_t = DataSelector::All)]
        data: DataSelector,
    },
    /// Grid of cutouts around every association
    Cutouts {
        #[command(flatten)]
        input: CutoutInput,
        #[arg(long, default_value_t = cutouts::DEFAULT_NCOLS)]
        ncols: usize,
        /// Output file stem; without it the figure opens in a window
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Paginated cutouts written to one PDF document
    Pages {
        #[command(flatten)]
        input: CutoutInput,
        #[arg(long, default_value_t = cutouts::DEFAULT_NROWS)]
        nrows: usize,
        #[arg(long, default_value_t = cutouts::DEFAULT_NCOLS)]
        ncols: usize,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args)]
struct CutoutInput {
    /// Background image
    image: PathBuf,
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    target: String,
    #[arg(long)]
    scale: u32,
    #[arg(long, default_value = "nuv")]
    band: String,
    #[arg(long, default_value = "v1p1")]
    version: String,
    /// Nebula label image outlined in red; the associations are then blue
    #[arg(long)]
    nebulae: Option<PathBuf>,
    /// Mark the association centres
    #[arg(long)]
    mark_centres: bool,
    /// Cutout edge length in arcsec
    #[arg(long, default_value_t = 4.0)]
    size: f64,
    /// Only the first N associations
    #[arg(long)]
    limit: Option<usize>,
}

struct Loaded {
    image: SkyImage,
    nebulae: Option<LabelMask>,
    assoc_mask: LabelMask,
    positions: Vec<clusterview::SkyCoord>,
    labels: Vec<String>,
}

impl CutoutInput {
    fn load(&self) -> anyhow::Result<Loaded> {
        let image = SkyImage::open(&self.image)
            .with_context(|| format!("cannot read {}", self.image.display()))?;
        let nebulae = match &self.nebulae {
            Some(path) => {
                let raw = SkyImage::open(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                Some(LabelMask::from_label_image(raw.data, raw.header, raw.wcs))
            }
            None => None,
        };
        let (catalogue, mask) = read_associations(
            &self.root,
            &self.target,
            self.scale,
            &self.band,
            &self.version,
            DataSelector::All,
        )?
        .into_parts();
        let (Some(catalogue), Some(assoc_mask)) = (catalogue, mask) else {
            bail!("catalogue and mask are both required");
        };

        let n = self.limit.unwrap_or(catalogue.len()).min(catalogue.len());
        let positions = catalogue.positions()[..n].to_vec();
        let labels = catalogue.ids()[..n].iter().map(|id| id.to_string()).collect();
        Ok(Loaded {
            image,
            nebulae,
            assoc_mask,
            positions,
            labels,
        })
    }
}

impl Loaded {
    fn layers(&self, mark_centres: bool) -> CutoutLayers<'_> {
        let (mask1, mask2) = match &self.nebulae {
            Some(nebulae) => (nebulae, Some(&self.assoc_mask)),
            None => (&self.assoc_mask, None),
        };
        CutoutLayers {
            image: &self.image,
            mask1,
            mask2,
            points: mark_centres.then_some(self.positions.as_slice()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Catalogue {
            root,
            target,
            scale_pc,
            band,
            version,
            data,
        } => {
            let associations = read_associations(&root, &target, scale_pc, &band, &version, data)?;
            print!("{associations}");
        }
        Command::Cutouts { input, ncols, out } => {
            let loaded = input.load()?;
            let fig = cutouts::multi_cutout(
                &loaded.positions,
                &loaded.layers(input.mark_centres),
                Some(loaded.labels.as_slice()),
                out.as_deref(),
                Angle::from_arcsec(input.size),
                ncols,
            )
            .context("cannot render cutouts")?;
            log::info!("{} panels, {} blank", fig.cells.len(), fig.blank_cells());
        }
        Command::Pages {
            input,
            nrows,
            ncols,
            out,
        } => {
            let loaded = input.load()?;
            let pages = cutouts::multi_page_cutout(
                &loaded.positions,
                &loaded.layers(input.mark_centres),
                Some(loaded.labels.as_slice()),
                &out,
                Angle::from_arcsec(input.size),
                nrows,
                ncols,
            )
            .context("cannot render pages")?;
            log::info!("wrote {} pages", pages.len());
        }
    }
    Ok(())
}
