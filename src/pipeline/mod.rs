pub mod stage1_load;
pub mod stage2_preprocess;
pub mod stage3_gating;
pub mod stage4_report;
