//! Standalone `.rm` stroke codec CLI, independent of any mount. A direct
//! rewrite of `remfmt_cli.c`'s `<input.rm> (svg|rm)` dispatch.

use std::io::{BufReader, Write};
use std::path::PathBuf;

use argh::FromArgs;

use remfs::stroke::{codec, render};

/// render or re-encode a `.rm` stroke file
#[derive(FromArgs)]
struct RemfmtArgs {
    /// input `.rm` file
    #[argh(positional)]
    input: PathBuf,

    /// output format: svg or rm
    #[argh(positional)]
    format: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args: RemfmtArgs = argh::from_env();

    let file = std::fs::File::open(&args.input)?;
    let Some(strokes) = codec::parse(&mut BufReader::new(file)) else {
        color_eyre::eyre::bail!("{:?} is not a valid .lines stream", args.input);
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.format.as_str() {
        "svg" => {
            let svg = render::render_svg(&strokes, &render::RenderParams::default());
            out.write_all(svg.as_bytes())?;
        }
        "png" => color_eyre::eyre::bail!("png output is not supported"),
        _ => codec::encode_v5(&strokes, &mut out)?,
    }

    Ok(())
}
