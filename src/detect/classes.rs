//! COCO class table and the allow-lists of classes treated as trash.

/// Class names of the 80-class COCO label set, indexed by class id.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Default allow-list: tableware, food, books, vases and toothbrushes.
pub const TRASH_CLASS_IDS: [u32; 19] = [
    39, 40, 41, 42, 43, 44, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 73, 75, 79,
];

/// Everything except vehicles, street furniture, animals, clothing,
/// electronics and large household items.
pub const BROAD_TRASH_CLASS_IDS: [u32; 35] = [
    0, 25, 29, 30, 31, 32, 33, 34, 35, 36, 37, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
    51, 52, 53, 54, 55, 73, 74, 75, 76, 77, 78, 79,
];

/// Human-readable COCO name for a class id.
pub fn class_name(class_id: u32) -> Option<&'static str> {
    COCO_CLASS_NAMES.get(class_id as usize).copied()
}

/// File-name-safe name for a class id: the COCO name with whitespace replaced
/// by `_`, or `class_<id>` for ids outside the table.
pub fn artifact_name(class_id: u32) -> String {
    match class_name(class_id) {
        Some(name) => name
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect(),
        None => format!("class_{}", class_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_resolve() {
        assert_eq!(class_name(41), Some("cup"));
        assert_eq!(class_name(79), Some("toothbrush"));
        assert_eq!(class_name(80), None);
    }

    #[test]
    fn artifact_names_are_path_safe() {
        assert_eq!(artifact_name(41), "cup");
        assert_eq!(artifact_name(40), "wine_glass");
        assert_eq!(artifact_name(200), "class_200");
    }

    #[test]
    fn allow_lists_are_sorted_and_in_range() {
        for list in [&TRASH_CLASS_IDS[..], &BROAD_TRASH_CLASS_IDS[..]] {
            assert!(list.windows(2).all(|w| w[0] < w[1]));
            assert!(list.iter().all(|&id| class_name(id).is_some()));
        }
        assert!(TRASH_CLASS_IDS
            .iter()
            .all(|id| BROAD_TRASH_CLASS_IDS.contains(id)));
    }
}
