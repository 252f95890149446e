pub mod capability_profile;
