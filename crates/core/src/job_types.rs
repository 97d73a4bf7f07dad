//! Well-known job-type identifiers understood by the worker fleet.
//!
//! Every submission to the job sink carries exactly one of these. They must
//! match the handler names registered on the worker side.

/// Run a keyword search job. Args: `[job_id]`.
pub const JOB_BY_KEYWORD: &str = "job-by-keyword";

/// Crawl a single external source. Args: `[job_id]`.
pub const JOB_BY_SOURCE: &str = "job-by-source";

/// React to a post. Args: `[subjob_id]`.
pub const SUBJOB_REACTION: &str = "subjob-reaction";

/// Comment on a post. Args: `[subjob_id]`.
pub const SUBJOB_COMMENT: &str = "subjob-comment";

/// Share a post. Args: `[subjob_id]`.
pub const SUBJOB_SHARE: &str = "subjob-share";

/// Extract an author's profile page. Args: `[subjob_id]`.
pub const SUBJOB_PROFILE_EXTRACTION: &str = "subjob-profile-extraction";

/// Pair one idle account, proxy and user agent into a new credential.
pub const WARM_CREDENTIAL: &str = "warm-credential";

/// Try to log every disabled account back in.
pub const RELOGIN_DISABLED_ACCOUNTS: &str = "re-login-disabled-accounts";

/// Re-test a disabled egress point. Args: `[proxy_id]`.
pub const RECHECK_EGRESS_POINT: &str = "recheck-egress-point";

/// All identifiers, for validation and registration on the consumer side.
pub const ALL: [&str; 9] = [
    JOB_BY_KEYWORD,
    JOB_BY_SOURCE,
    SUBJOB_REACTION,
    SUBJOB_COMMENT,
    SUBJOB_SHARE,
    SUBJOB_PROFILE_EXTRACTION,
    WARM_CREDENTIAL,
    RELOGIN_DISABLED_ACCOUNTS,
    RECHECK_EGRESS_POINT,
];

/// Whether `job_type` is one of the known identifiers.
pub fn is_known(job_type: &str) -> bool {
    ALL.contains(&job_type)
}
