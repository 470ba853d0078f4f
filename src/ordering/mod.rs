/// Natural ("human") ordering of media paths.
pub mod natural;
