mod helpers;
mod related;
