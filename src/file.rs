use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use crate::{
    blend::mul_un8,
    cel::{Cel, CelData},
    header::Header,
    layer::{Layer, LayerData, LayerKind, LayerType},
    parse::{self, ParseOptions},
    pixel::{Gray, Grid, Indexed, Pixel},
    slice::Slice,
    user_data::UserData,
    ColorPalette, PixelFormat, Result, Tag,
};
use image::{Rgba, RgbaImage};

/// A parsed Aseprite file.
///
/// Immutable once decoded; frames can be rendered from several threads at
/// the same time.
#[derive(Debug)]
pub struct AsepriteFile {
    pub(crate) header: Header,
    pub(crate) pixel_format: PixelFormat,
    pub(crate) palette: ColorPalette,
    pub(crate) layers: Vec<LayerData>,
    pub(crate) frames: Vec<FrameData>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) slices: Vec<Slice>,
    pub(crate) sprite_user_data: Option<UserData>,
}

#[derive(Debug, Clone)]
pub(crate) struct FrameData {
    pub(crate) duration: u16,
    pub(crate) cels: Vec<CelData>,
}

/// Options for compositing a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Also draw layers marked as reference layers. These are hidden in
    /// exported sprites.
    pub include_reference_layers: bool,
}

impl AsepriteFile {
    /// Load Aseprite file. Loads full file into memory.
    pub fn read_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        parse::read_aseprite(reader, &ParseOptions::default())
    }

    /// Load Aseprite file from any input that implements `std::io::Read`.
    ///
    /// You can use this to read from an in-memory file.
    pub fn read<R: Read>(input: R) -> Result<AsepriteFile> {
        parse::read_aseprite(input, &ParseOptions::default())
    }

    /// Like [AsepriteFile::read], with explicit [ParseOptions].
    pub fn read_with_options<R: Read>(input: R, options: &ParseOptions) -> Result<AsepriteFile> {
        parse::read_aseprite(input, options)
    }

    /// The file header as decoded.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.header.width as usize
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.header.height as usize
    }

    /// Width and height in pixels.
    pub fn size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// The pixel format used by the original file. Rendering always produces
    /// RGBA.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Pixel width:height ratio. 1:1 unless the file says otherwise.
    pub fn pixel_ratio(&self) -> (u8, u8) {
        self.header.pixel_ratio()
    }

    /// Pixel width divided by pixel height.
    pub fn pixel_aspect(&self) -> f32 {
        let (w, h) = self.pixel_ratio();
        w as f32 / h as f32
    }

    /// Whether layer opacity values are meaningful (header flag bit 0).
    ///
    /// Rendering applies layer opacity either way.
    pub fn layer_opacity_is_valid(&self) -> bool {
        self.header.layer_opacity_is_valid()
    }

    /// Deprecated global frame duration in milliseconds. Use
    /// [Frame::duration] instead.
    pub fn speed(&self) -> u16 {
        self.header.speed
    }

    /// Palette index that is always transparent.
    pub fn transparent_color_index(&self) -> u8 {
        self.header.transparent_color_index
    }

    /// Number of animation frames.
    pub fn num_frames(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Number of layers.
    pub fn num_layers(&self) -> u32 {
        self.layers.len() as u32
    }

    /// The color palette in the image.
    ///
    /// For indexed color images, this includes all colors used by individual
    /// cels. However, the final image after layer blending may contain colors
    /// outside of this palette (or with different transparency levels).
    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    /// Access a layer by ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is not valid. ID must be less than number of layers.
    pub fn layer(&self, id: u32) -> Layer {
        assert!(id < self.num_layers());
        Layer {
            file: self,
            layer_id: id,
        }
    }

    /// Access a layer by name.
    ///
    /// If multiple layers with the same name exist returns the layer with
    /// the lower ID.
    pub fn layer_by_name(&self, name: &str) -> Option<Layer> {
        self.layers().find(|layer| layer.name() == name)
    }

    /// An iterator over all layers, in the order they appear in the file.
    pub fn layers(&self) -> LayersIter {
        LayersIter {
            file: self,
            next: 0,
        }
    }

    /// Top-level group layers.
    pub fn subgroups(&self) -> impl Iterator<Item = Layer<'_>> {
        self.layers()
            .filter(|l| l.parent().is_none() && l.layer_type() == LayerType::Group)
    }

    /// Top-level image layers.
    pub fn images(&self) -> impl Iterator<Item = Layer<'_>> {
        self.layers()
            .filter(|l| l.parent().is_none() && l.layer_type() == LayerType::Image)
    }

    /// A reference to a single frame.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than `num_frames`.
    pub fn frame(&self, index: u32) -> Frame {
        assert!(index < self.num_frames());
        Frame { file: self, index }
    }

    /// All frames in order.
    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> {
        (0..self.num_frames()).map(move |index| self.frame(index))
    }

    /// Total number of tags.
    pub fn num_tags(&self) -> u32 {
        self.tags.len() as u32
    }

    /// All tags, in the order they appear in the file.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Get a reference to the tag by ID.
    ///
    /// # Panics
    ///
    /// Panics if `tag_id` is not less than `num_tags`.
    pub fn tag(&self, tag_id: u32) -> &Tag {
        &self.tags[tag_id as usize]
    }

    /// Lookup tag by name.
    ///
    /// If multiple tags with the same name exist, returns the one with the
    /// lower ID.
    pub fn tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag.name() == name)
    }

    /// All [Slice]s in the file.
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// The user data for the entire sprite, if any exists.
    pub fn sprite_user_data(&self) -> Option<&UserData> {
        self.sprite_user_data.as_ref()
    }

    /// Cel opacity scaled by the opacity of its layer.
    pub(crate) fn cel_opacity(&self, cel: &CelData) -> u8 {
        match self.layers[cel.layer_index as usize].kind {
            LayerKind::Image { opacity, .. } => mul_un8(cel.opacity as i32, opacity as i32) as u8,
            LayerKind::Group => cel.opacity,
        }
    }

    fn draw_cel<P: Pixel>(&self, canvas: &mut Grid<P>, cel: &CelData) {
        // Every cel is decoded with the document's pixel kind.
        let grid = P::grid_of(&cel.image);
        debug_assert!(grid.is_some(), "cel pixel kind differs from the document");
        let grid = match grid {
            Some(grid) => grid,
            None => return,
        };
        if let LayerKind::Image { blend_mode, .. } = self.layers[cel.layer_index as usize].kind {
            let blend_fn = P::blender(blend_mode);
            canvas.blend_from(
                grid,
                cel.x as i32,
                cel.y as i32,
                self.cel_opacity(cel),
                &blend_fn,
            );
        }
    }

    fn composite<'a, P, I>(&self, cels: I) -> Grid<P>
    where
        P: Pixel,
        I: IntoIterator<Item = &'a CelData>,
    {
        let mut canvas = Grid::filled(
            self.header.width,
            self.header.height,
            P::blank(&self.palette),
        );
        for cel in cels {
            self.draw_cel(&mut canvas, cel);
        }
        canvas
    }

    /// Composites `cels` in order and reports every canvas pixel to `f`.
    fn render_cels<'a, I, F>(&self, cels: I, f: F)
    where
        I: IntoIterator<Item = &'a CelData>,
        F: FnMut((u32, u32), Rgba<u8>),
    {
        match self.pixel_format {
            PixelFormat::Rgba => self
                .composite::<Rgba<u8>, _>(cels)
                .visit(&self.palette, f),
            PixelFormat::Grayscale => self.composite::<Gray, _>(cels).visit(&self.palette, f),
            PixelFormat::Indexed { .. } => {
                self.composite::<Indexed, _>(cels).visit(&self.palette, f)
            }
        }
    }

    fn image_from_cels<'a, I>(&self, cels: I) -> RgbaImage
    where
        I: IntoIterator<Item = &'a CelData>,
    {
        let mut image = RgbaImage::new(self.header.width as u32, self.header.height as u32);
        self.render_cels(cels, |(x, y), color| image.put_pixel(x, y, color));
        image
    }

    /// A single cel on an otherwise transparent canvas.
    pub(crate) fn cel_image(&self, cel: &CelData) -> RgbaImage {
        self.image_from_cels(std::iter::once(cel))
    }

    fn is_drawn(&self, cel: &CelData, options: &RenderOptions) -> bool {
        let layer = self.layer(cel.layer_index as u32);
        layer.is_globally_visible() && (options.include_reference_layers || !layer.is_reference())
    }
}

/// An iterator over layers. See [AsepriteFile::layers].
#[derive(Debug)]
pub struct LayersIter<'a> {
    file: &'a AsepriteFile,
    next: u32,
}

impl<'a> Iterator for LayersIter<'a> {
    type Item = Layer<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next < self.file.num_layers() {
            let item = self.file.layer(self.next);
            self.next += 1;
            Some(item)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.file.num_layers() - self.next) as usize;
        (left, Some(left))
    }
}

/// A reference to a single frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    file: &'a AsepriteFile,
    index: u32,
}

impl<'a> Frame<'a> {
    fn data(&self) -> &'a FrameData {
        &self.file.frames[self.index as usize]
    }

    /// Frame ID, i.e., the frame number.
    pub fn id(&self) -> u32 {
        self.index
    }

    /// Frame duration in milliseconds.
    pub fn duration(&self) -> u32 {
        self.data().duration as u32
    }

    /// Number of cels in this frame.
    pub fn num_cels(&self) -> usize {
        self.data().cels.len()
    }

    /// The cels of this frame in drawing order.
    pub fn cels(&self) -> impl Iterator<Item = Cel<'a>> {
        let file = self.file;
        let frame = self.index;
        (0..self.num_cels()).map(move |index| Cel { file, frame, index })
    }

    /// Get cel corresponding to the given layer in this frame, if the layer
    /// has one.
    pub fn cel_for_layer(&self, layer_id: u32) -> Option<Cel<'a>> {
        self.cels().find(|cel| cel.layer().id() == layer_id)
    }

    /// Composites the frame and calls `f` once for every canvas pixel with
    /// its position and final color. Skips invisible and reference layers.
    pub fn render<F>(&self, f: F)
    where
        F: FnMut((u32, u32), Rgba<u8>),
    {
        self.render_with(&RenderOptions::default(), f)
    }

    /// Like [Frame::render], with explicit [RenderOptions].
    pub fn render_with<F>(&self, options: &RenderOptions, f: F)
    where
        F: FnMut((u32, u32), Rgba<u8>),
    {
        let file = self.file;
        let cels = self.data().cels.iter().filter(|c| file.is_drawn(c, options));
        file.render_cels(cels, f)
    }

    /// Construct the image belonging to the specific animation frame. Combines
    /// layers according to their blend mode. Skips invisible layers (i.e.,
    /// layers with a deactivated eye icon) and reference layers.
    pub fn image(&self) -> RgbaImage {
        self.image_with(&RenderOptions::default())
    }

    /// Like [Frame::image], with explicit [RenderOptions].
    pub fn image_with(&self, options: &RenderOptions) -> RgbaImage {
        let file = self.file;
        let cels = self.data().cels.iter().filter(|c| file.is_drawn(c, options));
        file.image_from_cels(cels)
    }
}
