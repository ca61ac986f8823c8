#![warn(clippy::all)]
#![warn(missing_docs)]
/*!

Decoder for [Aseprite](https://www.aseprite.org/) files. This library reads
the binary Aseprite format ([file format specification][spec]) into an
immutable document and flattens frames into RGBA pixels the same way the
editor does, including layer groups and blend modes.

All three color modes are supported: RGBA, grayscale, and indexed. Pixels
keep their native representation until a frame is composited.

Note that this library can be rather slow when compiled without optimizations.
We recommend that you override the optimization settings for this dependency
in dev mode by adding the following to your `Cargo.toml`:

```text
[profile.dev.package.asedecode]
opt-level = 2  # or 3
```

[spec]: https://github.com/aseprite/aseprite/blob/master/docs/ase-file-specs.md

# Basic Usage

## Load file

The easiest way is to use [AsepriteFile::read_file] to load a file.

```no_run
use asedecode::AsepriteFile;
# use std::path::Path;
# let path = Path::new("./sprite.aseprite");
let ase = AsepriteFile::read_file(&path).unwrap();

println!("Size: {}x{}", ase.width(), ase.height());
println!("Frames: {}", ase.num_frames());
println!("Layers: {}", ase.num_layers());
```

Decoding is all or nothing: a file with a wrong magic number, a broken layer
hierarchy, or a chunk that cannot be decoded yields an [AsepriteParseError]
and no document. [ParseOptions] relaxes this for chunk types the decoder
does not know.

## Save frame as image

Usually you just want the final image. [Frame::image] returns an
`image::RgbaImage` from the [image](https://docs.rs/image) library.

```no_run
# use asedecode::AsepriteFile;
# use std::path::Path;
# let ase = AsepriteFile::read_file(Path::new("./sprite.aseprite")).unwrap();
let image = ase.frame(0).image();
image.save("frame0.png").unwrap();
```

This blends together all visible layers the same way Aseprite would.
Reference layers are skipped unless [RenderOptions] asks for them. To feed
pixels into your own buffer instead, use [Frame::render]:

```no_run
# use asedecode::AsepriteFile;
# use std::path::Path;
# let ase = AsepriteFile::read_file(Path::new("./sprite.aseprite")).unwrap();
let mut opaque = 0;
ase.frame(0).render(|(_x, _y), color| {
    if color.0[3] == 255 {
        opaque += 1;
    }
});
```

## Layers

You can access a [Layer] by name or by ID. Groups know their children, and
flags such as visibility can be queried with or without the enclosing groups.

```no_run
# use asedecode::AsepriteFile;
# use std::path::Path;
# let ase = AsepriteFile::read_file(Path::new("./sprite.aseprite")).unwrap();
let layer = ase.layer(0);
println!("Name of layer 0: {}", layer.name());
let layer = ase.layer_by_name("Layer 1").unwrap();
println!("Layer 1 is visible? {}", layer.is_globally_visible());
for group in ase.subgroups() {
    println!("{} has {} children", group.name(), group.children().count());
}
```

## Cels

A cel is the intersection of a frame and a layer. Because of this there are
multiple ways to access a cel:

```no_run
# use asedecode::AsepriteFile;
# use std::path::Path;
# let ase = AsepriteFile::read_file(Path::new("./sprite.aseprite")).unwrap();
let cel1 = ase.layer(0).frame(0);
let cel2 = ase.frame(0).cel_for_layer(0);

if let Some(cel) = cel1 {
    let image = cel.image();
}
```

*/

pub(crate) mod blend;
pub(crate) mod cel;
pub(crate) mod error;
pub(crate) mod file;
pub(crate) mod header;
pub(crate) mod layer;
pub(crate) mod palette;
pub(crate) mod parse;
pub(crate) mod pixel;
pub(crate) mod reader;
pub(crate) mod slice;
pub(crate) mod tags;
pub(crate) mod user_data;

/// A specialized `Result` type for Aseprite parsing functions.
pub type Result<T> = std::result::Result<T, AsepriteParseError>;

pub use blend::{blend_gray, blend_rgba};
pub use cel::Cel;
pub use error::{AsepriteParseError, ErrorKind};
pub use file::{AsepriteFile, Frame, LayersIter, RenderOptions};
pub use header::{Header, PixelFormat};
pub use layer::{BlendMode, Layer, LayerFlags, LayerType};
pub use palette::ColorPalette;
pub use parse::ParseOptions;
pub use pixel::Gray;
pub use slice::Slice;
pub use tags::{AnimationDirection, Tag};
pub use user_data::UserData;
