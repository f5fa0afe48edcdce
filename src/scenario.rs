// Reproduction scenario
//
// Setup: one device connection, then four exportable images sharing the same
// usage - two large enough for dedicated memory blocks, two small enough
// that the allocator packs them into one shared block.
// Verify: every pair of images must report distinct exported handles. The
// defect under investigation shows up as the two small images sharing one.

use anyhow::Result;
use ash::vk;
use thiserror::Error;

use crate::backend::{DeviceContext, ExportableImage};
use crate::config::ProbeConfig;

/// Usage every scenario image is created with.
pub const IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::SAMPLED.as_raw(),
);

/// Two images that should be backed independently report the same OS handle.
///
/// This is the allocator defect under investigation, not a bug in this
/// program.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("images '{first}' and '{second}' share external handle {handle:#x}")]
pub struct AliasedHandles {
    pub first: String,
    pub second: String,
    pub handle: u64,
}

/// Run the whole scenario: setup, then verification. Images are torn down on
/// every exit path, including the failing ones.
pub fn run(config: &ProbeConfig, device_index: Option<usize>) -> Result<()> {
    // --- setup phase ---
    let device = DeviceContext::new(config, device_index)?;

    let large = config.probe.large_side;
    let small = config.probe.small_side;
    let shapes = [
        (large, "large #1"),
        (large, "large #2"),
        (small, "small #1"),
        (small, "small #2"),
    ];

    let mut images = Vec::with_capacity(shapes.len());
    for (side, label) in shapes {
        images.push(ExportableImage::new(
            device.clone(),
            side,
            side,
            IMAGE_USAGE,
            label,
        )?);
    }

    // --- verify phase ---
    let handles: Vec<(String, u64)> = images
        .iter()
        .map(|image| (image.label().to_string(), image.handle_value()))
        .collect();

    for (label, value) in &handles {
        log::info!("{label}: external handle {value:#x}");
    }

    verify_distinct(&handles)?;
    log::info!(
        "All {} exported handles are pairwise distinct",
        handles.len()
    );

    Ok(())
}

/// Pairwise distinctness over any number of independently allocated images.
/// Reports the first aliased pair.
fn verify_distinct(handles: &[(String, u64)]) -> Result<(), AliasedHandles> {
    for (i, (first, a)) in handles.iter().enumerate() {
        for (second, b) in &handles[i + 1..] {
            if a == b {
                return Err(AliasedHandles {
                    first: first.clone(),
                    second: second.clone(),
                    handle: *a,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(values: &[u64]) -> Vec<(String, u64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (format!("image #{i}"), v))
            .collect()
    }

    #[test]
    fn distinct_handles_pass() {
        assert_eq!(verify_distinct(&labelled(&[])), Ok(()));
        assert_eq!(verify_distinct(&labelled(&[7])), Ok(()));
        assert_eq!(verify_distinct(&labelled(&[1, 2, 3, 4])), Ok(()));
        // Order must not matter.
        assert_eq!(verify_distinct(&labelled(&[4, 1, 3, 2])), Ok(()));
    }

    #[test]
    fn an_aliased_pair_is_reported_with_both_labels() {
        let err = verify_distinct(&labelled(&[10, 20, 30, 20])).unwrap_err();
        assert_eq!(err.first, "image #1");
        assert_eq!(err.second, "image #3");
        assert_eq!(err.handle, 20);
    }

    #[test]
    fn the_first_aliased_pair_wins() {
        // The known defect shape: the two small images (indices 2 and 3)
        // report the same value while the large ones differ.
        let err = verify_distinct(&labelled(&[100, 200, 55, 55])).unwrap_err();
        assert_eq!((err.first.as_str(), err.second.as_str()), ("image #2", "image #3"));

        // Multiple collisions: the earliest pair in scan order is reported.
        let err = verify_distinct(&labelled(&[9, 9, 9])).unwrap_err();
        assert_eq!((err.first.as_str(), err.second.as_str()), ("image #0", "image #1"));
    }
}
