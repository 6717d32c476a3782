use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{fs, io, path::Path};
use tracing_subscriber::EnvFilter;
use xivchara::{
    colortable::{ColorTable, R16G16B16A16F},
    error::Diagnostic,
    pbd::PbdFile,
    race::{deform_chain, race_chain, GenderRace},
    vertex::{decode_vertices, parse_declaration, MAX_STREAMS},
};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List .pbd deformer headers as .csv
    Pbd {
        /// Path to .pbd file (e.g. extracted "chara/xls/boneDeformer/human.pbd")
        file: Box<Path>,
    },
    /// Print the deformers applied when moving a mesh from one race code to another
    Chain {
        /// Path to .pbd file
        file: Box<Path>,
        /// Race code the mesh was made for (e.g. 0101)
        #[arg(short, long)]
        from: u16,
        /// Race code to deform onto (e.g. 1201)
        #[arg(short, long)]
        to: u16,
    },
    /// Decode a R16G16B16A16F color table → .csv, optionally .png
    Colortable {
        #[command(flatten)]
        table: TableArgs,
        /// Also write the table as image
        #[arg(short, long)]
        out: Option<Box<Path>>,
    },
    /// Show the rows a color table lookup blends for an index in [0, 1]
    Lookup {
        #[command(flatten)]
        table: TableArgs,
        index: f32,
    },
    /// Decode raw vertex streams → .csv
    Vertices {
        /// Vertex declaration, 8 bytes per element
        #[arg(short, long)]
        declaration: Box<Path>,
        /// Vertex stream files, in stream order
        #[arg(short, long, num_args = 1..=3, required = true)]
        stream: Vec<Box<Path>>,
        /// Byte stride of every stream, in stream order
        #[arg(long, num_args = 1..=3, required = true)]
        stride: Vec<u8>,
        /// Number of vertices to decode
        #[arg(short, long)]
        count: usize,
    },
}

#[derive(Args)]
struct TableArgs {
    /// Raw texture data
    file: Box<Path>,
    #[arg(long, default_value_t = 4)]
    width: u32,
    #[arg(long, default_value_t = 16)]
    height: u32,
    /// Byte pitch of one texel line, defaults to width * 8
    #[arg(long)]
    stride: Option<usize>,
}

impl TableArgs {
    fn read(&self) -> anyhow::Result<ColorTable> {
        let data = fs::read(&self.file)?;
        let stride = self.stride.unwrap_or(self.width as usize * 8);
        Ok(ColorTable::from_texture(
            R16G16B16A16F,
            self.width,
            self.height,
            stride,
            &data,
        )?)
    }
}

#[derive(Serialize)]
struct PbdRow {
    id: u16,
    deformer_id: u16,
    offset: i32,
    unk: f32,
    bones: Option<usize>,
}

#[derive(Serialize)]
struct ColorRow {
    row: usize,
    diffuse_r: f32,
    diffuse_g: f32,
    diffuse_b: f32,
    specular_mask: f32,
    specular_r: f32,
    specular_g: f32,
    specular_b: f32,
    shininess: f32,
    emissive_r: f32,
    emissive_g: f32,
    emissive_b: f32,
    tile_index: u16,
    repeat_x: f32,
    repeat_y: f32,
    skew_x: f32,
    skew_y: f32,
}

#[derive(Serialize)]
struct VertexRow {
    vertex: usize,
    x: Option<f32>,
    y: Option<f32>,
    z: Option<f32>,
    w: Option<f32>,
    u: Option<f32>,
    v: Option<f32>,
}

fn log_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        tracing::warn!(%diagnostic);
    }
}

fn list_pbd(path: &Path) -> anyhow::Result<()> {
    let pbd = PbdFile::parse(&fs::read(path)?)?;

    let mut w = csv::Writer::from_writer(io::stdout());
    for header in pbd.headers() {
        w.serialize(PbdRow {
            id: header.id,
            deformer_id: header.deformer_id,
            offset: header.offset,
            unk: header.unk,
            bones: pbd.deformer_at(header.offset).map(|d| d.bone_count()),
        })?;
    }
    w.flush()?;
    Ok(())
}

fn print_chain(path: &Path, from: u16, to: u16) -> anyhow::Result<()> {
    let (from, to) = (GenderRace::from_code(from), GenderRace::from_code(to));
    if from == GenderRace::Unknown || to == GenderRace::Unknown {
        bail!("Unknown race code");
    }

    let pbd = PbdFile::parse(&fs::read(path)?)?;
    let chain = deform_chain(&pbd, from, to)?;
    if chain.is_empty() {
        println!("{to} is not deformed from {from}");
    }
    for (race, deformer) in race_chain(from, to).iter().zip(chain) {
        println!(
            "{race} (offset {}, {} bones)",
            deformer.offset,
            deformer.bone_count()
        );
    }
    Ok(())
}

fn export_colortable(table: &TableArgs, out: Option<&Path>) -> anyhow::Result<()> {
    let table = table.read()?;

    let mut w = csv::Writer::from_writer(io::stdout());
    for (idx, row) in table.rows().iter().enumerate() {
        let (diffuse, specular, emissive) = (row.diffuse(), row.specular(), row.emissive());
        let (repeat, skew) = (row.tile_repeat(), row.tile_skew());
        w.serialize(ColorRow {
            row: idx,
            diffuse_r: diffuse.x,
            diffuse_g: diffuse.y,
            diffuse_b: diffuse.z,
            specular_mask: row.specular_mask(),
            specular_r: specular.x,
            specular_g: specular.y,
            specular_b: specular.z,
            shininess: row.shininess(),
            emissive_r: emissive.x,
            emissive_g: emissive.y,
            emissive_b: emissive.z,
            tile_index: row.tile_index(),
            repeat_x: repeat.x,
            repeat_y: repeat.y,
            skew_x: skew.x,
            skew_y: skew.y,
        })?;
    }
    w.flush()?;

    if let Some(out) = out {
        table.to_image().save(out)?;
        eprintln!("{}", out.to_string_lossy());
    }
    Ok(())
}

fn print_lookup(table: &TableArgs, index: f32) -> anyhow::Result<()> {
    let table = table.read()?;
    let (_, _, row) = table.lookup(index);
    let sampled = table.sample(index);

    let mut w = csv::Writer::from_writer(io::stdout());
    w.serialize(row)?;
    w.flush()?;
    println!("diffuse = {}", sampled.diffuse);
    println!("specular = {} (mask {})", sampled.specular, sampled.specular_mask);
    println!("emissive = {}", sampled.emissive);
    Ok(())
}

fn export_vertices(
    declaration: &Path,
    streams: &[Box<Path>],
    strides: &[u8],
    count: usize,
) -> anyhow::Result<()> {
    if streams.len() != strides.len() {
        bail!("Every --stream needs a matching --stride");
    }
    if streams.len() > MAX_STREAMS {
        bail!("At most {MAX_STREAMS} streams are supported");
    }

    let declaration = parse_declaration(&fs::read(declaration)?)?;
    let data = streams
        .iter()
        .map(fs::read)
        .collect::<Result<Vec<_>, _>>()?;

    let mut stream_data: [&[u8]; MAX_STREAMS] = [&[]; MAX_STREAMS];
    let mut stream_strides = [0u8; MAX_STREAMS];
    for (idx, (bytes, stride)) in data.iter().zip(strides).enumerate() {
        stream_data[idx] = bytes.as_slice();
        stream_strides[idx] = *stride;
    }

    let (vertices, diagnostics) =
        decode_vertices(count, &stream_data, &stream_strides, &declaration)?;
    log_diagnostics(&diagnostics);

    let mut w = csv::Writer::from_writer(io::stdout());
    for (idx, vertex) in vertices.iter().enumerate() {
        w.serialize(VertexRow {
            vertex: idx,
            x: vertex.position.map(|p| p.x),
            y: vertex.position.map(|p| p.y),
            z: vertex.position.map(|p| p.z),
            w: vertex.position.map(|p| p.w),
            u: vertex.uv.map(|uv| uv.x),
            v: vertex.uv.map(|uv| uv.y),
        })?;
    }
    w.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pbd { file } => list_pbd(&file),
        Commands::Chain { file, from, to } => print_chain(&file, from, to),
        Commands::Colortable { table, out } => export_colortable(&table, out.as_deref()),
        Commands::Lookup { table, index } => {
            if !(0.0..=1.0).contains(&index) {
                return Err(anyhow!("Lookup index must be within [0, 1]"));
            }
            print_lookup(&table, index)
        }
        Commands::Vertices {
            declaration,
            stream,
            stride,
            count,
        } => export_vertices(&declaration, &stream, &stride, count),
    }
}
