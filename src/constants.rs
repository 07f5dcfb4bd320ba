//! Property keys shared by the ingesters so the same quantity lands under one key
//! whatever table it came from.

pub const MASS: &str = "mass";
pub const RA: &str = "ra";
pub const DEC: &str = "dec";
pub const REDSHIFT: &str = "redshift";
pub const DISTANCE: &str = "distance";

pub const GALAXY_MORPHOLOGY: &str = "galaxy_morphology";
pub const GALAXY_INNER_PROFILE: &str = "galaxy_inner_profile";
pub const GALAXY_VEL_DISP: &str = "galaxy_vel_disp";
pub const GALAXY_VEL_DISP_BULGE: &str = "galaxy_vel_disp_bulge";
pub const GALAXY_MASS_BULGE: &str = "galaxy_mass_bulge";
pub const GALAXY_RAD_EFF_V: &str = "galaxy_rad_eff_v";
pub const GALAXY_RAD_EFF_I: &str = "galaxy_rad_eff_i";
pub const GALAXY_RAD_EFF_3P6: &str = "galaxy_rad_eff_3p6";
pub const GALAXY_MASS_TO_LIGHT_RATIO: &str = "galaxy_mass_to_light_ratio";

pub const FWHM_HBETA: &str = "fwhm_hbeta";
pub const FWHM_MGII: &str = "fwhm_mgii";
pub const FWHM_CIV: &str = "fwhm_civ";

// Built-in task names (used in config sections and on the CLI)
pub const TREMAINE_2002: &str = "tremaine2002";
pub const MCCONNELL_MA: &str = "mcconnell_ma";
pub const AGN_BHM_DATABASE: &str = "agn_bhm_database";
pub const SHEN_2008: &str = "shen2008";
