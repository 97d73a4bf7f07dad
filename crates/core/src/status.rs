//! Lookup enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding lookup table (`task_statuses`, `subjob_kinds`).
//! A `NULL` status column means "never dispatched" and has no variant.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database lookup ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database lookup ID, `None` for unknown IDs.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Seed-data name of the variant.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Dispatch status shared by jobs and subjobs.
    TaskStatus {
        InQueue = 1 => "in_queue",
        InProgress = 2 => "in_progress",
        Success = 3 => "success",
        Retry = 4 => "retry",
        Failed = 5 => "failed",
    }
}

impl TaskStatus {
    /// Statuses a worker may report when it finishes a job or subjob.
    pub const COMPLETIONS: [TaskStatus; 3] =
        [TaskStatus::Success, TaskStatus::Retry, TaskStatus::Failed];

    /// Whether this status is a worker-reported completion.
    pub fn is_completion(self) -> bool {
        Self::COMPLETIONS.contains(&self)
    }
}

define_status_enum! {
    /// Content-scoped subjob kinds.
    SubjobKind {
        Reaction = 1 => "reaction",
        Comment = 2 => "comment",
        Share = 3 => "share",
        ProfileExtraction = 4 => "profile_extraction",
    }
}
