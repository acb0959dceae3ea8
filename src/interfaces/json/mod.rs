pub mod template_reader;
