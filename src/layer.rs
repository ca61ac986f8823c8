use crate::{
    cel::Cel, reader::AseReader, user_data::UserData, AsepriteFile, AsepriteParseError, Result,
};
use bitflags::bitflags;
use std::iter::successors;

/// Types of layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    /// A regular image layer. This is the normal layer type.
    Image,
    /// A layer that groups other layers and does not contain any image data.
    /// In Aseprite these are represented by a folder icon.
    Group,
}

bitflags! {
    /// Flags stored with every layer. Most of them only matter for the
    /// editor; see [Layer] for the queries that combine them with the
    /// flags of the parent groups.
    pub struct LayerFlags: u32 {
        /// Layer is visible (eye icon is enabled).
        const VISIBLE = 0x0001;
        /// Layer can be modified (lock icon is disabled).
        const EDITABLE = 0x0002;
        /// Layer cannot be moved.
        const MOVEMENT_LOCKED = 0x0004;
        /// Layer is background (stack order cannot be changed).
        const BACKGROUND = 0x0008;
        /// Prefer to link cels when the user copies them.
        const CONTINUOUS = 0x0010;
        /// Prefer to show this group layer collapsed.
        const COLLAPSED = 0x0020;
        /// This is a reference layer.
        const REFERENCE = 0x0040;
    }
}

impl LayerFlags {
    /// Shortcut for `.contains(LayerFlags::VISIBLE)`.
    pub fn is_visible(&self) -> bool {
        self.contains(LayerFlags::VISIBLE)
    }
}

/// Describes how a layer is combined with the layers underneath it.
///
/// The first five variants never appear in files; they are the special
/// compositing modes Aseprite uses internally and are available through
/// [crate::blend_rgba] and [crate::blend_gray].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Replace the backdrop, ignoring opacity.
    Src,
    /// Interpolate between backdrop and source, alpha included.
    Merge,
    /// Black or white depending on the brightness of the backdrop.
    NegBW,
    RedTint,
    BlueTint,
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Addition,
    Subtract,
    Divide,
}

pub(crate) fn parse_blend_mode(id: u16) -> Result<BlendMode> {
    match id {
        0 => Ok(BlendMode::Normal),
        1 => Ok(BlendMode::Multiply),
        2 => Ok(BlendMode::Screen),
        3 => Ok(BlendMode::Overlay),
        4 => Ok(BlendMode::Darken),
        5 => Ok(BlendMode::Lighten),
        6 => Ok(BlendMode::ColorDodge),
        7 => Ok(BlendMode::ColorBurn),
        8 => Ok(BlendMode::HardLight),
        9 => Ok(BlendMode::SoftLight),
        10 => Ok(BlendMode::Difference),
        11 => Ok(BlendMode::Exclusion),
        12 => Ok(BlendMode::Hue),
        13 => Ok(BlendMode::Saturation),
        14 => Ok(BlendMode::Color),
        15 => Ok(BlendMode::Luminosity),
        16 => Ok(BlendMode::Addition),
        17 => Ok(BlendMode::Subtract),
        18 => Ok(BlendMode::Divide),
        _ => Err(AsepriteParseError::UnsupportedFormat(format!(
            "Invalid/Unsupported blend mode: {}",
            id
        ))),
    }
}

/// Image layers carry a blend mode and an opacity, groups carry neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayerKind {
    Image { blend_mode: BlendMode, opacity: u8 },
    Group,
}

#[derive(Debug, Clone)]
pub(crate) struct LayerData {
    pub(crate) name: String,
    pub(crate) flags: LayerFlags,
    pub(crate) level: u16,
    pub(crate) kind: LayerKind,
    pub(crate) parent: Option<u32>,
    pub(crate) user_data: Option<UserData>,
}

impl LayerData {
    pub(crate) fn is_group(&self) -> bool {
        self.kind == LayerKind::Group
    }
}

pub(crate) fn parse_chunk(data: &[u8]) -> Result<LayerData> {
    let mut reader = AseReader::new(data);

    let flags = reader.word()?;
    let layer_type = reader.word()?;
    let level = reader.word()?;
    let _default_width = reader.word()?;
    let _default_height = reader.word()?;
    let blend_mode = reader.word()?;
    let opacity = reader.byte()?;
    reader.skip_reserved(3)?;
    let name = reader.string()?;

    let kind = match layer_type {
        0 => LayerKind::Image {
            blend_mode: parse_blend_mode(blend_mode)?,
            opacity,
        },
        1 => LayerKind::Group,
        _ => {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Invalid layer type: {}",
                layer_type
            )))
        }
    };

    Ok(LayerData {
        name,
        flags: LayerFlags::from_bits_truncate(flags as u32),
        level,
        kind,
        parent: None,
        user_data: None,
    })
}

/// Rebuilds the parent links from the flat, depth-tagged layer stream.
///
/// Keeps the most recently opened group for every depth above the current
/// layer. A layer at depth `d` is a child of the open group at `d - 1`.
#[derive(Debug, Default)]
pub(crate) struct LayerHierarchy {
    open_groups: Vec<u32>,
    previous_level: Option<u16>,
}

impl LayerHierarchy {
    /// Registers the layer with index `id` and returns its parent.
    pub(crate) fn place(&mut self, id: u32, level: u16, is_group: bool) -> Result<Option<u32>> {
        let broken = || AsepriteParseError::BrokenHierarchy {
            layer: id as usize,
            level,
            previous_level: self.previous_level,
        };
        if let Some(previous) = self.previous_level {
            if level as u32 > previous as u32 + 1 {
                return Err(broken());
            }
        }
        let depth = level as usize;
        let parent = if depth == 0 {
            None
        } else {
            match self.open_groups.get(depth - 1) {
                Some(&group) => Some(group),
                None => return Err(broken()),
            }
        };

        // Anything deeper than this layer belongs to a closed branch.
        self.open_groups.truncate(depth);
        if is_group {
            self.open_groups.push(id);
        }
        self.previous_level = Some(level);
        Ok(parent)
    }
}

/// A reference to a single layer.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub(crate) file: &'a AsepriteFile,
    pub(crate) layer_id: u32,
}

impl<'a> Layer<'a> {
    fn data(&self) -> &'a LayerData {
        &self.file.layers[self.layer_id as usize]
    }

    /// This layer's ID, i.e. its position in the layer stream.
    pub fn id(&self) -> u32 {
        self.layer_id
    }

    /// Layer's flags
    pub fn flags(&self) -> LayerFlags {
        self.data().flags
    }

    /// Name of the layer
    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    /// Nesting depth: 0 for top-level layers.
    pub fn level(&self) -> u16 {
        self.data().level
    }

    /// Describes whether this is a regular layer or a group layer.
    pub fn layer_type(&self) -> LayerType {
        match self.data().kind {
            LayerKind::Image { .. } => LayerType::Image,
            LayerKind::Group => LayerType::Group,
        }
    }

    /// Blend mode of an image layer. Describes how this layer is combined
    /// with the layers underneath it. `None` for groups.
    pub fn blend_mode(&self) -> Option<BlendMode> {
        match self.data().kind {
            LayerKind::Image { blend_mode, .. } => Some(blend_mode),
            LayerKind::Group => None,
        }
    }

    /// Base opacity of an image layer. `None` for groups.
    pub fn opacity(&self) -> Option<u8> {
        match self.data().kind {
            LayerKind::Image { opacity, .. } => Some(opacity),
            LayerKind::Group => None,
        }
    }

    /// The user data attached to this layer, if any.
    pub fn user_data(&self) -> Option<&'a UserData> {
        self.data().user_data.as_ref()
    }

    /// The group containing this layer, if any.
    ///
    /// Does not indicate the blend order of layers (i.e., which layers are
    /// above or below).
    pub fn parent(&self) -> Option<Layer<'a>> {
        self.data().parent.map(|id| self.file.layer(id))
    }

    fn ancestors(&self) -> impl Iterator<Item = Layer<'a>> {
        successors(self.parent(), |layer| layer.parent())
    }

    /// Layers directly inside this group.
    pub fn children(&self) -> impl Iterator<Item = Layer<'a>> {
        let id = self.layer_id;
        self.file
            .layers()
            .filter(move |layer| layer.data().parent == Some(id))
    }

    /// Image layers directly inside this group.
    pub fn images(&self) -> impl Iterator<Item = Layer<'a>> {
        self.children()
            .filter(|layer| layer.layer_type() == LayerType::Image)
    }

    /// Groups directly inside this group.
    pub fn subgroups(&self) -> impl Iterator<Item = Layer<'a>> {
        self.children()
            .filter(|layer| layer.layer_type() == LayerType::Group)
    }

    /// All layers nested in this group, at any depth.
    pub fn descendants(&self) -> impl Iterator<Item = Layer<'a>> {
        let id = self.layer_id;
        self.file
            .layers()
            .filter(move |layer| layer.ancestors().any(|a| a.layer_id == id))
    }

    /// Eye icon of this layer alone.
    pub fn is_visible(&self) -> bool {
        self.flags().contains(LayerFlags::VISIBLE)
    }

    #[allow(missing_docs)]
    pub fn is_editable(&self) -> bool {
        self.flags().contains(LayerFlags::EDITABLE)
    }

    #[allow(missing_docs)]
    pub fn is_locked(&self) -> bool {
        self.flags().contains(LayerFlags::MOVEMENT_LOCKED)
    }

    #[allow(missing_docs)]
    pub fn is_background(&self) -> bool {
        self.flags().contains(LayerFlags::BACKGROUND)
    }

    #[allow(missing_docs)]
    pub fn prefers_linked_cels(&self) -> bool {
        self.flags().contains(LayerFlags::CONTINUOUS)
    }

    #[allow(missing_docs)]
    pub fn is_reference(&self) -> bool {
        self.flags().contains(LayerFlags::REFERENCE)
    }

    #[allow(missing_docs)]
    pub fn is_collapsed(&self) -> bool {
        self.flags().contains(LayerFlags::COLLAPSED)
    }

    /// Returns if this layer is visible. This requires that this layer and all
    /// of its parent layers are visible.
    pub fn is_globally_visible(&self) -> bool {
        self.is_visible() && self.ancestors().all(|a| a.is_visible())
    }

    /// This layer and all of its parents are editable.
    pub fn is_globally_editable(&self) -> bool {
        self.is_editable() && self.ancestors().all(|a| a.is_editable())
    }

    /// This layer or any of its parents is locked.
    pub fn is_globally_locked(&self) -> bool {
        self.is_locked() || self.ancestors().any(|a| a.is_locked())
    }

    /// Some parent group is collapsed.
    pub fn is_within_collapsed_group(&self) -> bool {
        self.ancestors().any(|a| a.is_collapsed())
    }

    /// The cel of this layer in the given frame, if there is one.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is not less than the number of frames.
    pub fn frame(&self, frame_id: u32) -> Option<Cel<'a>> {
        self.file.frame(frame_id).cel_for_layer(self.layer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tests::layer_chunk;

    fn place_all(levels: &[(u16, bool)]) -> Result<Vec<Option<u32>>> {
        let mut hierarchy = LayerHierarchy::default();
        levels
            .iter()
            .enumerate()
            .map(|(id, &(level, is_group))| hierarchy.place(id as u32, level, is_group))
            .collect()
    }

    #[test]
    fn rebuilds_parents() {
        let parents = place_all(&[
            (0, true),
            (1, false),
            (1, true),
            (2, false),
            (1, false),
            (0, false),
        ])
        .unwrap();
        assert_eq!(parents, vec![None, Some(0), Some(0), Some(2), Some(0), None]);
    }

    #[test]
    fn closed_branches_are_not_reused() {
        // Layer 3 is a sibling of group 1, so group 1 is closed when layer 4
        // shows up one level deeper.
        let err = place_all(&[(0, true), (1, true), (2, false), (1, false), (2, false)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenHierarchy);
    }

    #[test]
    fn depth_jump_fails() {
        match place_all(&[(0, true), (2, false)]) {
            Err(AsepriteParseError::BrokenHierarchy {
                layer,
                level,
                previous_level,
            }) => {
                assert_eq!(layer, 1);
                assert_eq!(level, 2);
                assert_eq!(previous_level, Some(0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn child_of_image_layer_fails() {
        let err = place_all(&[(0, false), (1, false)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenHierarchy);
        let err = place_all(&[(1, false)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenHierarchy);
    }

    #[test]
    fn parses_image_layer() {
        let data = layer_chunk(0x0041, 0, 2, 1, 128, "Ink");
        let layer = parse_chunk(&data).unwrap();
        assert_eq!(layer.name, "Ink");
        assert_eq!(layer.level, 2);
        assert!(layer.flags.is_visible());
        assert!(layer.flags.contains(LayerFlags::REFERENCE));
        assert_eq!(
            layer.kind,
            LayerKind::Image {
                blend_mode: BlendMode::Multiply,
                opacity: 128
            }
        );
    }

    #[test]
    fn parses_group_layer() {
        let data = layer_chunk(0x0021, 1, 0, 0, 255, "Folder");
        let layer = parse_chunk(&data).unwrap();
        assert!(layer.is_group());
        assert!(layer.flags.contains(LayerFlags::COLLAPSED));
    }

    #[test]
    fn rejects_unknown_layer_type_and_blend_mode() {
        let err = parse_chunk(&layer_chunk(1, 2, 0, 0, 255, "Tiles")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = parse_chunk(&layer_chunk(1, 0, 0, 19, 255, "Odd")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }
}
