pub mod httproute;
