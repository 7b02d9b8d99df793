//! Channel classification: recovers plane/component structure from a flat list of
//! channel names such as `diffuse.R`, `diffuse.G`, `A`.
//!
//! A name is split at its first `.` into a plane name and a component name. Only the
//! components `R`, `G`, `B` and `A` (exact, case-sensitive) are kept; everything else is
//! filtered out without error.

use std::collections::BTreeMap;

use crate::utils::error_handling::{Result, SplitError};

/// Component of a plane, with a fixed slot in an RGBA pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentRole {
    R,
    G,
    B,
    A,
}

impl ComponentRole {
    pub const ALL: [ComponentRole; 4] = [Self::R, Self::G, Self::B, Self::A];

    /// Exact match against the four component letters. No aliases: `r`, `Red`,
    /// `bar.R` all return `None`.
    pub fn parse(component: &str) -> Option<Self> {
        match component {
            "R" => Some(Self::R),
            "G" => Some(Self::G),
            "B" => Some(Self::B),
            "A" => Some(Self::A),
            _ => None,
        }
    }

    /// Position in an RGBA pixel (R=0, G=1, B=2, A=3).
    #[inline]
    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::R => "R",
            Self::G => "G",
            Self::B => "B",
            Self::A => "A",
        }
    }
}

/// Splits a channel name at the first `.`; names without a dot belong to the
/// default plane `""`.
#[inline]
pub fn split_channel_name(name: &str) -> (&str, &str) {
    name.split_once('.').unwrap_or(("", name))
}

/// Returns the plane name and role of a channel, or `None` if the channel is not
/// part of any plane.
pub fn classify_channel(name: &str) -> Option<(&str, ComponentRole)> {
    let (plane, component) = split_channel_name(name);
    ComponentRole::parse(component).map(|role| (plane, role))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedChannel {
    /// Full source channel name, e.g. `diffuse.R`.
    pub name: String,
    pub role: ComponentRole,
    /// Index into the interleaved per-pixel tuple of the source image.
    pub source_index: usize,
}

/// A named group of 1-4 channels that becomes one output image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    name: String,
    // Zawsze posortowane wg roli: R, G, B, A
    channels: Vec<ClassifiedChannel>,
}

impl Plane {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), channels: Vec::with_capacity(4) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unnamed plane formed by channels without a prefix.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    pub fn channels(&self) -> &[ClassifiedChannel] {
        &self.channels
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Name used for output files; the default plane takes `default_label`.
    pub fn output_label<'a>(&'a self, default_label: &'a str) -> &'a str {
        if self.is_default() { default_label } else { &self.name }
    }

    fn insert(&mut self, channel: ClassifiedChannel) -> Result<()> {
        let pos = self.channels.partition_point(|c| c.role < channel.role);
        if let Some(existing) = self.channels.get(pos).filter(|c| c.role == channel.role) {
            return Err(SplitError::DuplicateComponent {
                plane: self.name.clone(),
                component: channel.role.as_str(),
                first: existing.name.clone(),
                second: channel.name,
            });
        }
        self.channels.insert(pos, channel);
        Ok(())
    }
}

/// Result of classifying all channels of an image.
///
/// Planes iterate in ascending lexicographic order of their names, so the default
/// plane (empty name) always comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    planes: BTreeMap<String, Plane>,
    discarded: Vec<String>,
}

impl PlaneLayout {
    pub fn planes(&self) -> impl Iterator<Item = &Plane> {
        self.planes.values()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&Plane> {
        self.planes.get(name)
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Channel names that did not match any plane, in source order.
    pub fn discarded(&self) -> &[String] {
        &self.discarded
    }

    pub fn retained_channel_count(&self) -> usize {
        self.planes.values().map(Plane::channel_count).sum()
    }
}

/// Groups channel names into planes.
///
/// `index_of` resolves a channel name to its index in the source pixel tuple. The
/// container may store channels in a different order than they are listed, so the
/// iteration position is never used as the index.
pub fn classify_channels<'a, I, F>(names: I, index_of: F) -> Result<PlaneLayout>
where
    I: IntoIterator<Item = &'a str>,
    F: Fn(&str) -> Option<usize>,
{
    let mut layout = PlaneLayout::default();

    for name in names {
        let Some((plane_name, role)) = classify_channel(name) else {
            log::debug!("[classify] skipping channel {}", name);
            layout.discarded.push(name.to_string());
            continue;
        };

        let source_index = index_of(name)
            .ok_or_else(|| SplitError::UnknownChannel { channel: name.to_string() })?;

        layout
            .planes
            .entry(plane_name.to_string())
            .or_insert_with(|| Plane::new(plane_name))
            .insert(ClassifiedChannel { name: name.to_string(), role, source_index })?;
    }

    Ok(layout)
}
