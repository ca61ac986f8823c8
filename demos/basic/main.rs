//
// Reads a file and writes out a PNG file for every frame.
//
// Usage: cargo run --example basic -- [input.aseprite] [output dir]
//
use std::env;
use std::path::PathBuf;
use std::process;

use asedecode::AsepriteFile;
use image::ImageFormat;

fn main() {
    let basedir = PathBuf::from("demos").join("basic");
    let mut args = env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| basedir.join("input.aseprite"));
    let outdir = args.next().map(PathBuf::from).unwrap_or(basedir);

    let ase = match AsepriteFile::read_file(&input) {
        Ok(ase) => ase,
        Err(err) => {
            eprintln!("{}: {}", input.display(), err);
            process::exit(1);
        }
    };
    println!(
        "{}x{}, {} frames, {} layers",
        ase.width(),
        ase.height(),
        ase.num_frames(),
        ase.num_layers()
    );
    for frame in ase.frames() {
        let output = outdir.join(format!("output_{}.png", frame.id()));
        frame
            .image()
            .save_with_format(&output, ImageFormat::Png)
            .unwrap();
    }
}
