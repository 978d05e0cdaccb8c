// SPDX-License-Identifier: Apache-2.0
//! Wire tag numbering for content records and their KV payloads.
//!
//! Outer record tags identify the proto kind; each record payload is a sorted
//! KV stream with a per-kind field namespace. Tags 1..=15 are reserved for
//! fields common to every kind.

/// Outer record tags for the content stream.
pub mod record {
    /// Material proto record.
    pub const MATERIAL: u32 = 1;
    /// Item proto record.
    pub const ITEM: u32 = 2;
    /// Container proto record.
    pub const CONTAINER: u32 = 3;
    /// Structure proto record.
    pub const STRUCTURE: u32 = 4;
    /// Process proto record.
    pub const PROCESS: u32 = 5;
    /// Job template proto record.
    pub const JOB_TEMPLATE: u32 = 6;
    /// Spline profile proto record.
    pub const SPLINE_PROFILE: u32 = 7;
    /// Research node proto record.
    pub const RESEARCH: u32 = 8;
    /// Research point-source proto record.
    pub const RESEARCH_POINT_SOURCE: u32 = 9;
    /// Policy rule proto record.
    pub const POLICY_RULE: u32 = 10;
    /// Deposit proto record.
    pub const DEPOSIT: u32 = 11;
}

/// KV fields shared by every proto kind.
pub mod common {
    /// Primary key (u32). Also the record's sort id.
    pub const ID: u32 = 1;
    /// Display name (UTF-8).
    pub const NAME: u32 = 2;
    /// Content tag mask (u32).
    pub const TAGS: u32 = 3;
}

/// Material proto fields.
pub mod material {
    /// Density (Q16.16).
    pub const DENSITY: u32 = 16;
}

/// Item proto fields.
pub mod item {
    /// Base trade value (Q16.16).
    pub const BASE_VALUE: u32 = 16;
    /// Mass per unit (Q16.16).
    pub const UNIT_MASS: u32 = 17;
    /// Volume per unit (Q16.16).
    pub const UNIT_VOLUME: u32 = 18;
    /// Backing material id (u32).
    pub const MATERIAL_ID: u32 = 19;
}

/// Container proto fields.
pub mod container {
    /// Slot count; 0 means bulk-only (u16).
    pub const SLOT_COUNT: u32 = 16;
    /// Volume capacity (Q16.16).
    pub const MAX_VOLUME: u32 = 17;
    /// Mass capacity (Q16.16).
    pub const MAX_MASS: u32 = 18;
}

/// Structure proto fields.
pub mod structure {
    /// Input container proto id (u32).
    pub const INV_IN: u32 = 16;
    /// Output container proto id (u32).
    pub const INV_OUT: u32 = 17;
    /// Allowed process id; repeated, first is the default (u32).
    pub const PROCESS_ALLOWED: u32 = 18;
}

/// Process proto fields.
pub mod process {
    /// Base cycle duration in ticks (Q16.16).
    pub const BASE_DURATION: u32 = 16;
    /// IO term; repeated sub-KV (blob).
    pub const IO_TERM: u32 = 17;
    /// Research yield; repeated sub-KV (blob).
    pub const RESEARCH_YIELD: u32 = 18;

    /// IO term sub-KV fields.
    pub mod io_term {
        /// Term kind: 1 input item, 2 output item (u16).
        pub const KIND: u32 = 1;
        /// Item id (u32).
        pub const ITEM_ID: u32 = 2;
        /// Rate per tick (Q16.16).
        pub const RATE: u32 = 3;
    }
}

/// Research yield sub-KV fields (shared by processes and job templates).
pub mod research_yield {
    /// Point kind (u16).
    pub const KIND: u32 = 1;
    /// Amount (Q32.32).
    pub const AMOUNT: u32 = 2;
}

/// Job template proto fields.
pub mod job_template {
    /// Purpose code (u16).
    pub const PURPOSE: u32 = 16;
    /// Bound process id, 0 for any (u32).
    pub const PROCESS_ID: u32 = 17;
    /// Bound structure proto id, 0 for any (u32).
    pub const STRUCTURE_ID: u32 = 18;
    /// Requirements KV body (blob).
    pub const REQUIREMENTS: u32 = 19;
    /// Rewards KV body (blob).
    pub const REWARDS: u32 = 20;
    /// Research yield; repeated sub-KV (blob).
    pub const RESEARCH_YIELD: u32 = 21;

    /// Requirements sub-KV fields.
    pub mod requirements {
        /// Capability tags the agent must cover (u32 mask).
        pub const AGENT_TAGS: u32 = 1;
        /// Work duration in ticks (Q16.16); default 1.
        pub const DURATION: u32 = 2;
    }

    /// Rewards sub-KV fields.
    pub mod rewards {
        /// Payment sub-KV (blob).
        pub const PAYMENT: u32 = 1;

        /// Payment sub-KV fields.
        pub mod payment {
            /// Debited account id (u32).
            pub const FROM_ACCOUNT: u32 = 1;
            /// Credited account id (u32).
            pub const TO_ACCOUNT: u32 = 2;
            /// Amount (Q32.32).
            pub const AMOUNT: u32 = 3;
        }
    }
}

/// Spline profile proto fields.
pub mod spline_profile {
    /// Profile kind: 1 item, 2 fluid, 3 vehicle, 4 agent (u16).
    pub const KIND: u32 = 16;
    /// Profile flags (u16).
    pub const FLAGS: u32 = 17;
    /// Base speed in world units per tick (Q16.16).
    pub const BASE_SPEED: u32 = 18;
    /// Maximum climbable grade (Q16.16).
    pub const MAX_GRADE: u32 = 19;
    /// Carrying capacity (Q16.16).
    pub const CAPACITY: u32 = 20;
    /// Model parameter KV body (blob).
    pub const PARAMS: u32 = 21;
}

/// Research node proto fields.
pub mod research {
    /// Required points to complete (Q32.32).
    pub const COST: u32 = 16;
    /// Prerequisite research id; repeated (u32).
    pub const PREREQ: u32 = 17;
}

/// Research point-source proto fields.
pub mod point_source {
    /// Point kind this source routes (u16).
    pub const KIND: u32 = 16;
    /// Explicit target research id (u32).
    pub const TARGET_RESEARCH_ID: u32 = 17;
    /// Targets must carry all of these tags (u32 mask).
    pub const TARGET_TAGS_ALL: u32 = 18;
    /// Targets must carry any of these tags (u32 mask).
    pub const TARGET_TAGS_ANY: u32 = 19;
}

/// Policy rule proto fields. Scope/condition/effect bodies stay TLV so rules
/// remain pure data.
pub mod policy_rule {
    /// Scope KV body (blob).
    pub const SCOPE: u32 = 16;
    /// Conditions KV body (blob).
    pub const CONDITIONS: u32 = 17;
    /// Effect KV body (blob).
    pub const EFFECT: u32 = 18;

    /// Scope sub-KV fields.
    pub mod scope {
        /// Required subject kind (u32).
        pub const SUBJECT_KIND: u32 = 1;
        /// Matching subject id; repeated, any-of (u32).
        pub const SUBJECT_ID: u32 = 2;
        /// Subject must carry all of these tags (u32 mask).
        pub const SUBJECT_TAGS_ALL: u32 = 3;
        /// Subject must carry any of these tags (u32 mask).
        pub const SUBJECT_TAGS_ANY: u32 = 4;
        /// Matching org id; repeated, any-of (u32).
        pub const ORG_ID: u32 = 5;
    }

    /// Condition sub-KV fields.
    pub mod condition {
        /// Org must have completed this research (u32).
        pub const RESEARCH_COMPLETED: u32 = 1;
        /// Org must not have completed this research (u32).
        pub const RESEARCH_NOT_COMPLETED: u32 = 2;
    }

    /// Effect sub-KV fields.
    pub mod effect {
        /// 0 forbids; anything else allows (u32).
        pub const ALLOWED: u32 = 1;
        /// Rate multiplier factor (Q16.16).
        pub const MULTIPLIER: u32 = 2;
        /// Multiplier cap; 0 = unset (Q16.16).
        pub const CAP: u32 = 3;
    }
}

/// Deposit proto fields.
pub mod deposit {
    /// Resource channel id (u16).
    pub const CHANNEL_ID: u32 = 16;
    /// Yielded material id (u32).
    pub const MATERIAL_ID: u32 = 17;
    /// Model parameter KV body (blob).
    pub const PARAMS: u32 = 18;

    /// Strata model parameter sub-KV fields.
    pub mod strata {
        /// Mean ore grade (Q16.16).
        pub const MEAN_GRADE: u32 = 1;
        /// Mean quantity per cell (Q16.16).
        pub const MEAN_QUANTITY: u32 = 2;
        /// Noise amplitude scale (Q16.16).
        pub const NOISE_SCALE: u32 = 3;
        /// Regeneration per tick (Q16.16).
        pub const REGEN_RATE: u32 = 4;
    }
}
