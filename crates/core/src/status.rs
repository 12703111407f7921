//! Status helper enums mapping to SMALLINT lookup values.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! used by the `batches.status_id` and `jobs.status_id` columns.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Reconstruct from a database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
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
    /// Batch lifecycle status.
    BatchStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        PartiallyFailed = 4,
        Failed = 5,
        Cancelled = 6,
    }
}

define_status_enum! {
    /// Per-job execution status.
    JobStatus {
        Queued = 1,
        Dispatched = 2,
        Running = 3,
        Completed = 4,
        Failed = 5,
        Cancelled = 6,
    }
}

impl JobStatus {
    /// Terminal statuses admit no further transition (cancellation included:
    /// it only ever applies to non-terminal jobs).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Jobs counted against a batch's `max_concurrent` window.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Dispatched | Self::Running)
    }
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyFailed | Self::Failed | Self::Cancelled
        )
    }
}

/// Terminal job statuses, in id order.
pub const TERMINAL_JOB_STATUSES: [JobStatus; 3] =
    [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];
