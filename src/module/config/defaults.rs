//! Built-in Default Parameter Set
//!
//! Every recognized section and key ships with a concrete default value, so
//! the pipeline never runs with an undefined parameter: merging any scope's
//! file on top of the defaults can only add or override keys. The template
//! below is also written out verbatim when a session directory has no
//! `Config.toml` yet.

use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use super::resolver::ResolvedParameterSet;
use super::store::{Scope, ScopedParameterStore};
use crate::module::define;

/// Parse the embedded template as the `BuiltinDefault` scope.
pub fn default_store() -> ScopedParameterStore {
    ScopedParameterStore::from_str(DEFAULT_CONFIG, Scope::BuiltinDefault, Path::new("<builtin>"))
        .expect("builtin default template is well-formed")
}

/// The fully populated parameter set every resolution starts from. Every
/// key's provenance is `BuiltinDefault`.
pub fn default_set() -> ResolvedParameterSet {
    let mut set = ResolvedParameterSet::new();
    set.merge_store(&default_store());
    set
}

/// Write the default template into `dir` as a starter `Config.toml`, unless
/// one already exists there. Returns the file path.
pub fn write_template(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join(define::path::CONF_FILE);
    if !path.is_file() {
        let mut file = File::create(&path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;
    }
    Ok(path)
}

// Default configuration data in TOML format. If a parameter is not set in a
// Trial's Config.toml, its value is looked up in the Participant's file,
// then the Session's, then here.
pub const DEFAULT_CONFIG: &str = r#"[project]
multi_person = false # true for trials with multiple participants
participant_height = 1.72 # m # float, or list of floats if multi-person
participant_mass = 70.0 # kg # only used for marker augmentation and scaling
frame_rate = 'auto' # fps # int, or 'auto' to read it from the video
frame_range = [] # e.g. [10, 300], or [] for all frames
exclude_from_batch = [] # list of '<participant_dir>/<trial_dir>' to skip in batch runs

[pose]
vid_img_extension = 'mp4' # any video or image extension
pose_model = 'HALPE_26' # 'HALPE_26', 'COCO_133', 'COCO_17', or 'CUSTOM' (see [pose.<MODEL>] declarations)
mode = 'balanced' # 'lightweight', 'balanced', 'performance'
det_frequency = 1 # run person detection every N frames, track in between
display_detection = true
overwrite_pose = false
save_video = 'to_video' # 'to_video', 'to_images', 'none', or a list of them
output_format = 'openpose' # 'openpose', 'mmpose', 'deeplabcut', 'none', or a list of them

[synchronization]
display_sync_plots = true
keypoints_to_consider = ['RWrist'] # 'all', or a list of keypoint names with sharp vertical motion
approx_time_maxspeed = 'auto' # 'auto', or a list of times (s), one per camera
time_range_around_maxspeed = 2.0 # s
likelihood_threshold = 0.4
filter_cutoff = 6
filter_order = 4

[calibration]
calibration_type = 'convert' # 'convert' or 'calculate'

   [calibration.convert]
   convert_from = 'qualisys' # 'caliscope', 'qualisys', 'optitrack', 'vicon', 'opencap', 'easymocap', 'biocv', 'anipose', or 'freemocap'
      [calibration.convert.caliscope] # no parameter needed
      [calibration.convert.qualisys]
      binning_factor = 1 # usually 1, except when filming in 540p where it usually is 2
      [calibration.convert.optitrack] # no parameter needed
      [calibration.convert.vicon] # no parameter needed
      [calibration.convert.opencap] # no parameter needed
      [calibration.convert.easymocap] # no parameter needed
      [calibration.convert.biocv] # no parameter needed
      [calibration.convert.anipose] # no parameter needed
      [calibration.convert.freemocap] # no parameter needed

   [calibration.calculate]
      [calibration.calculate.intrinsics]
      overwrite_intrinsics = false
      show_detection_intrinsics = true
      intrinsics_extension = 'jpg'
      extract_every_N_sec = 1 # if video, extract frames every N seconds (can be < 1)
      intrinsics_corners_nb = [4, 7]
      intrinsics_square_size = 60 # mm

      [calibration.calculate.extrinsics]
      calculate_extrinsics = true
      extrinsics_method = 'scene' # 'board', 'scene', 'keypoints'
      moving_cameras = false # not implemented yet

         [calibration.calculate.extrinsics.board]
         show_reprojection_error = true
         extrinsics_extension = 'png'
         extrinsics_corners_nb = [4, 7] # [H, W] rather than [w, h]
         extrinsics_square_size = 60 # mm

         [calibration.calculate.extrinsics.scene]
         show_reprojection_error = true
         extrinsics_extension = 'png'
         # 3D coordinates to be manually labelled on images, in m (NOT mm!)
         object_coords_3d = [[-2.0, 0.3, 0.0],
                             [-2.0, 0.0, 0.0],
                             [-2.0, 0.0, 0.05],
                             [-2.0, -0.3, 0.0],
                             [0.0, 0.3, 0.0],
                             [0.0, 0.0, 0.0],
                             [0.0, 0.0, 0.05],
                             [0.0, -0.3, 0.0]]

         [calibration.calculate.extrinsics.keypoints]
         # coming soon!

[personAssociation]
likelihood_threshold_association = 0.3

   [personAssociation.single_person]
   reproj_error_threshold_association = 20 # px
   tracked_keypoint = 'Neck' # a stable keypoint for tracking the person of interest

   [personAssociation.multi_person]
   reconstruction_error_threshold = 0.1 # 0.1 = 10 cm
   min_affinity = 0.2 # affinity below which a correspondence is ignored

[triangulation]
reproj_error_threshold_triangulation = 15 # px
likelihood_threshold_triangulation = 0.3
min_cameras_for_triangulation = 2
interpolation = 'linear' # 'linear', 'slinear', 'quadratic', 'cubic', or 'none'
interp_if_gap_smaller_than = 10 # do not interpolate bigger gaps
show_interp_indices = true
fill_large_gaps_with = 'last_value' # 'last_value', 'nan', or 'zeros'
handle_LR_swap = false
undistort_points = false
make_c3d = true # save triangulated data in c3d format in addition to trc

[filtering]
type = 'butterworth' # 'butterworth', 'kalman', 'gaussian', 'LOESS', 'median', 'butterworth_on_speed'
display_figures = true
make_c3d = true

   [filtering.butterworth]
   order = 4
   cut_off_frequency = 6 # Hz
   [filtering.kalman]
   trust_ratio = 100 # = measurement_trust / process_trust
   smooth = true
   [filtering.butterworth_on_speed]
   order = 4
   cut_off_frequency = 10 # Hz
   [filtering.gaussian]
   sigma_kernel = 2 # px
   [filtering.LOESS]
   nb_values_used = 30 # = fraction of data used * nb frames
   [filtering.median]
   kernel_size = 9

[markerAugmentation]
make_c3d = true

[kinematics]
use_augmentation = true # use the model with augmented markers
right_left_symmetry = true
remove_individual_scaling_setup = true
remove_individual_IK_setup = true
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::config::store::SectionPath;
    use std::fs;
    use toml::Value;

    #[test]
    fn test_default_store_covers_every_stage() {
        let store = default_store();
        for section in [
            "project",
            "pose",
            "synchronization",
            "calibration",
            "personAssociation",
            "triangulation",
            "filtering",
            "markerAugmentation",
            "kinematics",
        ] {
            assert!(
                store
                    .sections()
                    .any(|(path, _)| path == &SectionPath::from_dotted(section)),
                "missing default section {}",
                section
            );
        }
        assert_eq!(
            store.get(&SectionPath::from_dotted("filtering.butterworth"), "order"),
            Some(&Value::Integer(4))
        );
    }

    #[test]
    fn test_default_set_provenance() {
        let set = default_set();
        let path = SectionPath::from_dotted("triangulation");
        assert_eq!(
            set.get(&path, "min_cameras_for_triangulation"),
            Some(&Value::Integer(2))
        );
        assert_eq!(
            set.provenance(&path, "min_cameras_for_triangulation"),
            Some(Scope::BuiltinDefault)
        );
    }

    #[test]
    fn test_write_template() {
        let dir = Path::new("/tmp/trialpipetest/write_template");
        fs::create_dir_all(dir).unwrap();
        let _ = fs::remove_file(dir.join(define::path::CONF_FILE));

        let path = write_template(dir).unwrap();
        assert!(path.is_file());
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, DEFAULT_CONFIG);

        // A second call must not clobber an existing file
        fs::write(&path, "[project]\nmulti_person = true\n").unwrap();
        write_template(dir).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("multi_person = true"));
    }
}
