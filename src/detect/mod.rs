mod backend;
mod backends;
mod classes;
mod classify;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{TractClassifier, TractDetector};
pub use classes::{
    artifact_name, class_name, BROAD_TRASH_CLASS_IDS, COCO_CLASS_NAMES, TRASH_CLASS_IDS,
};
pub use classify::{Classification, Classifier, WASTE_CATEGORIES};
pub use result::{non_maximum_suppression, Detection};
