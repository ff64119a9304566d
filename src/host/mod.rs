//! Voxel editor data model exposed to scripts
//!
//! `Goxel` is the application root. It owns one [`Image`], which owns an
//! ordered list of [`Layer`]s. Scripts reach the root through a single global
//! and can append layers with `goxel.image.layers.new()`.

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, Ordering};

use rquickjs::{Ctx, IntoJs, Value};

use crate::bindings::dispatch::{read_buffer, write_buffer};
use crate::bindings::{
    Attribute, AttributeKind, ClassDescriptor, DList, Link, Linked, NativeClass, NativeHandle,
    LIST_CLASS,
};

/// Capacity of a layer name, terminator included.
pub const LAYER_NAME_LEN: usize = 256;

static NEXT_LAYER_ID: AtomicI32 = AtomicI32::new(1);

/// Classes a default script host registers, proxy class first.
pub static CLASSES: [&ClassDescriptor; 4] = [&LIST_CLASS, &GOXEL_CLASS, &IMAGE_CLASS, &LAYER_CLASS];

// ============================================================================
// Layer
// ============================================================================

#[repr(C)]
pub struct Layer {
    #[allow(dead_code)]
    link: Link,
    id: i32,
    visible: bool,
    name: [u8; LAYER_NAME_LEN],
}

unsafe impl Linked for Layer {}

impl Layer {
    /// Creates a visible, unnamed layer with a fresh id.
    pub fn new() -> Self {
        Layer {
            link: Link::new(),
            id: NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed),
            visible: true,
            name: [0; LAYER_NAME_LEN],
        }
    }

    pub fn with_name(name: &str) -> Self {
        let mut layer = Self::new();
        layer.set_name(name);
        layer
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn name(&self) -> String {
        read_buffer(NonNull::from(&self.name[..]))
    }

    /// Stores `name`, truncated to fit the fixed buffer.
    pub fn set_name(&mut self, name: &str) {
        write_buffer(NonNull::from(&mut self.name[..]), name);
    }
}

impl Default for Layer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("visible", &self.visible)
            .finish()
    }
}

fn construct_layer() -> NonNull<()> {
    NonNull::from(Box::leak(Box::new(Layer::new()))).cast()
}

pub static LAYER_CLASS: ClassDescriptor = ClassDescriptor {
    name: "Layer",
    constructor: Some(construct_layer),
    factory: None,
    attributes: &[
        crate::string_attr!("name", Layer, name),
        crate::plain_attr!("id", Layer, id),
        crate::plain_attr!("visible", Layer, visible),
    ],
};

impl NativeClass for Layer {
    fn class() -> &'static ClassDescriptor {
        &LAYER_CLASS
    }
}

// ============================================================================
// Image
// ============================================================================

#[repr(C)]
#[derive(Debug)]
pub struct Image {
    layers: DList<Layer>,
    active_layer: *mut Layer,
}

impl Image {
    pub fn new() -> Self {
        Image {
            layers: DList::new(),
            active_layer: ptr::null_mut(),
        }
    }

    pub fn layers(&self) -> &DList<Layer> {
        &self.layers
    }

    /// Appends `layer` and makes it the active one.
    pub fn add_layer(&mut self, layer: Layer) -> NonNull<Layer> {
        let added = self.layers.push_back(Box::new(layer));
        self.active_layer = added.as_ptr();
        added
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        unsafe { self.active_layer.as_ref() }
    }

    /// Selects the layer at `index`, returning false when out of range.
    pub fn select_layer(&mut self, index: usize) -> bool {
        match self.layers.raw().get(index) {
            Some(node) => {
                self.active_layer = node.cast::<Layer>().as_ptr();
                true
            }
            None => false,
        }
    }
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

pub static IMAGE_CLASS: ClassDescriptor = ClassDescriptor {
    name: "Image",
    constructor: None,
    factory: None,
    attributes: &[
        crate::collection_attr!("layers", Image, layers, &LAYER_CLASS),
        crate::object_attr!("active_layer", Image, active_layer, &LAYER_CLASS),
    ],
};

impl NativeClass for Image {
    fn class() -> &'static ClassDescriptor {
        &IMAGE_CLASS
    }
}

// ============================================================================
// Goxel
// ============================================================================

/// Application root.
#[repr(C)]
#[derive(Debug)]
pub struct Goxel {
    image: *mut Image,
}

impl Goxel {
    pub fn new() -> Self {
        Self::with_image(Image::new())
    }

    pub fn with_image(image: Image) -> Self {
        Goxel {
            image: Box::into_raw(Box::new(image)),
        }
    }

    pub fn image(&self) -> &Image {
        unsafe { &*self.image }
    }

    pub fn image_mut(&mut self) -> &mut Image {
        unsafe { &mut *self.image }
    }
}

impl Default for Goxel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Goxel {
    fn drop(&mut self) {
        if !self.image.is_null() {
            drop(unsafe { Box::from_raw(self.image) });
        }
    }
}

fn goxel_version<'js>(ctx: &Ctx<'js>, _handle: &NativeHandle) -> rquickjs::Result<Value<'js>> {
    env!("CARGO_PKG_VERSION").into_js(ctx)
}

pub static GOXEL_CLASS: ClassDescriptor = ClassDescriptor {
    name: "Goxel",
    constructor: None,
    factory: None,
    attributes: &[
        crate::object_attr!("image", Goxel, image, &IMAGE_CLASS),
        Attribute {
            name: "version",
            kind: AttributeKind::Getter(goxel_version),
        },
    ],
};

impl NativeClass for Goxel {
    fn class() -> &'static ClassDescriptor {
        &GOXEL_CLASS
    }
}
