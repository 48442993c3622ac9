use gatehouse_core::Role;
use serde::{Deserialize, Serialize};

use super::Course;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One slot in an outstation record's approval sequence.
///
/// ```text
/// btech / mtech:  officeSecretary → dugc → hod → hostelOffice → completed
/// phd:            instructor → officeSecretary → dpgc → hod → dean
///                 → hostelOffice → completed
/// ```
///
/// The string forms are persisted in records and in the per-stage
/// decision map; they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Instructor,
    OfficeSecretary,
    Dpgc,
    Dugc,
    Hod,
    Dean,
    HostelOffice,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instructor => "instructor",
            Self::OfficeSecretary => "officeSecretary",
            Self::Dpgc => "dpgc",
            Self::Dugc => "dugc",
            Self::Hod => "hod",
            Self::Dean => "dean",
            Self::HostelOffice => "hostelOffice",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "instructor" => Some(Self::Instructor),
            "officeSecretary" => Some(Self::OfficeSecretary),
            "dpgc" => Some(Self::Dpgc),
            "dugc" => Some(Self::Dugc),
            "hod" => Some(Self::Hod),
            "dean" => Some(Self::Dean),
            "hostelOffice" => Some(Self::HostelOffice),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// The role that decides this stage. `None` for the terminal marker.
    pub fn owning_role(&self) -> Option<Role> {
        match self {
            Self::Instructor => Some(Role::Instructor),
            Self::OfficeSecretary => Some(Role::OfficeSecretary),
            Self::Dpgc => Some(Role::Dpgc),
            Self::Dugc => Some(Role::Dugc),
            Self::Hod => Some(Role::Hod),
            Self::Dean => Some(Role::Dean),
            Self::HostelOffice => Some(Role::HostelOffice),
            Self::Completed => None,
        }
    }

    /// How an actor's claim to decide this stage is scoped.
    pub fn scope(&self) -> Option<StageScope> {
        match self {
            Self::Instructor => Some(StageScope::Assignment),
            Self::OfficeSecretary | Self::Dpgc | Self::Dugc | Self::Hod => {
                Some(StageScope::Department)
            }
            Self::Dean | Self::HostelOffice => Some(StageScope::Global),
            Self::Completed => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How approver ownership of a stage is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageScope {
    /// Actor's department must match the record's department.
    Department,
    /// Actor must be the instructor the student named on the record.
    Assignment,
    /// Any holder of the role campus-wide.
    Global,
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

const STANDARD: &[Stage] = &[
    Stage::OfficeSecretary,
    Stage::Dugc,
    Stage::Hod,
    Stage::HostelOffice,
];

const DOCTORAL: &[Stage] = &[
    Stage::Instructor,
    Stage::OfficeSecretary,
    Stage::Dpgc,
    Stage::Hod,
    Stage::Dean,
    Stage::HostelOffice,
];

/// The full approval sequence for a course, excluding the terminal
/// `completed` marker.
pub fn sequence(course: Course) -> &'static [Stage] {
    if course.is_doctoral() { DOCTORAL } else { STANDARD }
}

/// The stage a freshly created record starts at.
pub fn initial_stage(course: Course) -> Stage {
    sequence(course)[0]
}

/// The stage after `current` in the course's sequence. `None` when
/// `current` is the terminal approval stage (or not in the sequence).
pub fn next_stage(course: Course, current: Stage) -> Option<Stage> {
    let seq = sequence(course);
    let pos = seq.iter().position(|s| *s == current)?;
    seq.get(pos + 1).copied()
}

/// The stage decided by `role`, if the role decides one at all.
pub fn stage_for_role(role: Role) -> Option<Stage> {
    match role {
        Role::Instructor => Some(Stage::Instructor),
        Role::OfficeSecretary => Some(Stage::OfficeSecretary),
        Role::Dpgc => Some(Stage::Dpgc),
        Role::Dugc => Some(Stage::Dugc),
        Role::Hod => Some(Stage::Hod),
        Role::Dean => Some(Stage::Dean),
        Role::HostelOffice => Some(Stage::HostelOffice),
        Role::Student | Role::Guard => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_names_are_exact() {
        assert_eq!(Stage::Instructor.as_str(), "instructor");
        assert_eq!(Stage::OfficeSecretary.as_str(), "officeSecretary");
        assert_eq!(Stage::Dpgc.as_str(), "dpgc");
        assert_eq!(Stage::Dugc.as_str(), "dugc");
        assert_eq!(Stage::Hod.as_str(), "hod");
        assert_eq!(Stage::Dean.as_str(), "dean");
        assert_eq!(Stage::HostelOffice.as_str(), "hostelOffice");
        assert_eq!(Stage::Completed.as_str(), "completed");
        assert_eq!(
            serde_json::to_string(&Stage::HostelOffice).unwrap(),
            "\"hostelOffice\""
        );
    }

    #[test]
    fn string_roundtrip() {
        for s in [
            Stage::Instructor,
            Stage::OfficeSecretary,
            Stage::Dpgc,
            Stage::Dugc,
            Stage::Hod,
            Stage::Dean,
            Stage::HostelOffice,
            Stage::Completed,
        ] {
            assert_eq!(Stage::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn standard_sequence_walk() {
        assert_eq!(initial_stage(Course::Btech), Stage::OfficeSecretary);
        assert_eq!(next_stage(Course::Btech, Stage::OfficeSecretary), Some(Stage::Dugc));
        assert_eq!(next_stage(Course::Btech, Stage::Dugc), Some(Stage::Hod));
        assert_eq!(next_stage(Course::Btech, Stage::Hod), Some(Stage::HostelOffice));
        assert_eq!(next_stage(Course::Btech, Stage::HostelOffice), None);
    }

    #[test]
    fn doctoral_sequence_walk() {
        assert_eq!(initial_stage(Course::Phd), Stage::Instructor);
        assert_eq!(next_stage(Course::Phd, Stage::Instructor), Some(Stage::OfficeSecretary));
        assert_eq!(next_stage(Course::Phd, Stage::OfficeSecretary), Some(Stage::Dpgc));
        assert_eq!(next_stage(Course::Phd, Stage::Dpgc), Some(Stage::Hod));
        assert_eq!(next_stage(Course::Phd, Stage::Hod), Some(Stage::Dean));
        assert_eq!(next_stage(Course::Phd, Stage::Dean), Some(Stage::HostelOffice));
        assert_eq!(next_stage(Course::Phd, Stage::HostelOffice), None);
    }

    #[test]
    fn doctoral_only_stages_not_in_standard() {
        assert_eq!(next_stage(Course::Mtech, Stage::Instructor), None);
        assert_eq!(next_stage(Course::Btech, Stage::Dpgc), None);
        assert!(!sequence(Course::Mtech).contains(&Stage::Dean));
    }

    #[test]
    fn stage_ownership() {
        assert_eq!(Stage::Hod.owning_role(), Some(Role::Hod));
        assert_eq!(Stage::Completed.owning_role(), None);
        assert_eq!(stage_for_role(Role::Dugc), Some(Stage::Dugc));
        assert_eq!(stage_for_role(Role::Student), None);
        assert_eq!(stage_for_role(Role::Guard), None);
    }

    #[test]
    fn stage_scopes() {
        assert_eq!(Stage::Instructor.scope(), Some(StageScope::Assignment));
        assert_eq!(Stage::Hod.scope(), Some(StageScope::Department));
        assert_eq!(Stage::Dean.scope(), Some(StageScope::Global));
        assert_eq!(Stage::HostelOffice.scope(), Some(StageScope::Global));
    }
}
